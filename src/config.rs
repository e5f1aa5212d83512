//! Runtime configuration for the vanity keypair search.

use std::time::Duration;

use clap::{Args, Parser, Subcommand};

use crate::codec::{ProgramRegisters, DEFAULT_PREFIX, DEFAULT_PROGRAM_ID};
use crate::matcher::{find_invalid_char, Criteria};
use crate::worker::{default_threads, SearchOptions, SearchRequest, DEFAULT_BATCH_SIZE};

/// Base-58 addresses are at most this long.
const MAX_ADDRESS_LEN: usize = 44;

/// Solana Vanity Keypair Search with PoW address IDs
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Config {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Search for keypairs whose address matches a pattern
    Search(SearchArgs),
    /// Serve JSON-lines search requests on stdin, events on stdout
    Stdio(StdioArgs),
    /// Split an address into its PoW parts and derive its register
    Decode(DecodeArgs),
    /// Derive the register address for a PoW ID
    Register(RegisterArgs),
    /// Print synthetic PoW addresses
    Example(ExampleArgs),
}

#[derive(Args, Debug, Clone)]
pub struct SearchArgs {
    /// Required address start (base-58 characters only)
    #[arg(short = 's', long)]
    pub start: Option<String>,

    /// Required address end (base-58 characters only)
    #[arg(short = 'e', long)]
    pub end: Option<String>,

    /// Number of worker threads (default: half the CPU cores)
    #[arg(short = 'w', long)]
    pub workers: Option<usize>,

    /// Keypairs per worker before it reports progress and is re-assigned
    #[arg(short = 'b', long, default_value_t = DEFAULT_BATCH_SIZE)]
    pub batch_size: u64,

    /// Stop after finding N keypairs (0 = run forever)
    #[arg(short = 'n', long, default_value = "1")]
    pub count: usize,

    /// Progress report interval in seconds
    #[arg(short = 'r', long, default_value = "5")]
    pub report_interval: u64,

    /// Seconds a worker may go without reporting before it is flagged
    #[arg(long, default_value = "30")]
    pub stall_timeout: u64,

    #[command(flatten)]
    pub pow: PowArgs,

    /// Emit JSON lines ({"match":[..]}, {"exit":N}) instead of text
    #[arg(long, default_value = "false")]
    pub json: bool,
}

#[derive(Args, Debug, Clone)]
pub struct StdioArgs {
    /// Number of worker threads (default: half the CPU cores)
    #[arg(short = 'w', long)]
    pub workers: Option<usize>,

    /// Seconds a worker may go without reporting before it is flagged
    #[arg(long, default_value = "30")]
    pub stall_timeout: u64,

    #[command(flatten)]
    pub pow: PowArgs,
}

/// Settings of the PoW ID scheme.
#[derive(Args, Debug, Clone)]
pub struct PowArgs {
    /// Literal prefix of PoW addresses
    #[arg(long, default_value = DEFAULT_PREFIX)]
    pub prefix: String,

    /// Mint program that owns the register accounts
    #[arg(long, default_value = DEFAULT_PROGRAM_ID)]
    pub program_id: String,
}

#[derive(Args, Debug, Clone)]
pub struct DecodeArgs {
    /// Base-58 address to decode
    pub address: String,

    #[command(flatten)]
    pub pow: PowArgs,
}

#[derive(Args, Debug, Clone)]
pub struct RegisterArgs {
    /// PoW ID
    pub id: u32,

    #[command(flatten)]
    pub pow: PowArgs,
}

#[derive(Args, Debug, Clone)]
pub struct ExampleArgs {
    /// How many examples to print
    #[arg(short = 'n', long, default_value = "1")]
    pub count: usize,

    #[command(flatten)]
    pub pow: PowArgs,
}

impl SearchArgs {
    /// Returns the number of workers, defaulting to half the CPU count
    pub fn worker_count(&self) -> usize {
        self.workers.unwrap_or_else(default_threads).max(1)
    }

    /// Validates the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_anchor("Start", self.start.as_deref())?;
        validate_anchor("End", self.end.as_deref())?;

        let total_len = self.start.as_ref().map_or(0, String::len)
            + self.end.as_ref().map_or(0, String::len);
        if total_len > MAX_ADDRESS_LEN {
            return Err(ConfigError::InvalidPattern(format!(
                "Combined start + end cannot be longer than {} characters",
                MAX_ADDRESS_LEN
            )));
        }

        if self.batch_size == 0 {
            return Err(ConfigError::InvalidBatchSize);
        }

        if self.workers == Some(0) {
            return Err(ConfigError::InvalidWorkers);
        }

        self.pow.validate()
    }

    /// Returns the search criteria; no anchors means the PoW pattern
    pub fn criteria(&self) -> Criteria {
        Criteria::from_anchors(self.start.clone(), self.end.clone())
    }

    /// Builds the coordinator options
    pub fn search_options(&self) -> SearchOptions {
        SearchOptions {
            criteria: self.criteria(),
            pow_prefix: self.pow.prefix.clone(),
            threads: Some(self.worker_count()),
            batch_size: self.batch_size,
            stall_timeout: Duration::from_secs(self.stall_timeout),
        }
    }
}

impl StdioArgs {
    /// Validates the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.workers == Some(0) {
            return Err(ConfigError::InvalidWorkers);
        }
        self.pow.validate()
    }

    /// Coordinator options for one wire request
    pub fn search_options(&self, request: SearchRequest) -> SearchOptions {
        SearchOptions {
            pow_prefix: self.pow.prefix.clone(),
            threads: self.workers,
            stall_timeout: Duration::from_secs(self.stall_timeout),
            ..SearchOptions::from_request(request)
        }
    }
}

impl PowArgs {
    /// Validates the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.prefix.is_empty() {
            return Err(ConfigError::InvalidPattern("Prefix cannot be empty".into()));
        }
        if let Some(c) = self.prefix.chars().find(char::is_ascii_digit) {
            return Err(ConfigError::InvalidPattern(format!(
                "Prefix cannot contain digits (found '{}')",
                c
            )));
        }
        validate_anchor("Prefix", Some(&self.prefix))?;

        self.registers().map(|_| ())
    }

    /// Parses the program id into a register deriver
    pub fn registers(&self) -> Result<ProgramRegisters, ConfigError> {
        self.program_id
            .parse::<ProgramRegisters>()
            .map_err(|e| ConfigError::InvalidProgramId(e.to_string()))
    }
}

/// Checks a start or end anchor against the base-58 alphabet.
pub fn validate_anchor(name: &str, anchor: Option<&str>) -> Result<(), ConfigError> {
    let Some(anchor) = anchor else {
        return Ok(());
    };

    if anchor.is_empty() {
        return Err(ConfigError::InvalidPattern(format!("{} cannot be empty", name)));
    }

    if let Some(c) = find_invalid_char(anchor) {
        return Err(ConfigError::InvalidPattern(format!(
            "{} contains '{}', which never occurs in base-58 (no 0, O, I or l)",
            name, c
        )));
    }

    if anchor.len() > MAX_ADDRESS_LEN {
        return Err(ConfigError::InvalidPattern(format!(
            "{} cannot be longer than {} characters (full address)",
            name, MAX_ADDRESS_LEN
        )));
    }

    Ok(())
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid pattern: {0}")]
    InvalidPattern(String),

    #[error("Batch size must be greater than zero")]
    InvalidBatchSize,

    #[error("Worker count must be greater than zero")]
    InvalidWorkers,

    #[error("Invalid program id: {0}")]
    InvalidProgramId(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Config {
        Config::try_parse_from(std::iter::once("pow-vanity").chain(args.iter().copied()))
            .unwrap()
    }

    fn search_args(args: &[&str]) -> SearchArgs {
        let mut full = vec!["search"];
        full.extend_from_slice(args);
        match parse(&full).command {
            Command::Search(search) => search,
            other => panic!("expected search, got {:?}", other),
        }
    }

    #[test]
    fn test_defaults() {
        let args = search_args(&[]);
        assert!(args.validate().is_ok());
        assert_eq!(args.criteria(), Criteria::Pow);
        assert_eq!(args.batch_size, DEFAULT_BATCH_SIZE);
        assert_eq!(args.pow.prefix, "pow");
        assert_eq!(args.worker_count(), default_threads());
    }

    #[test]
    fn test_valid_pattern() {
        let args = search_args(&["--start", "pow7", "--end", "zz", "-w", "4", "-b", "50"]);
        assert!(args.validate().is_ok());
        assert_eq!(
            args.criteria(),
            Criteria::StartAndEnd {
                start: "pow7".into(),
                end: "zz".into()
            }
        );
        let options = args.search_options();
        assert_eq!(options.threads, Some(4));
        assert_eq!(options.batch_size, 50);
    }

    #[test]
    fn test_invalid_pattern() {
        assert!(search_args(&["--start", "0x"]).validate().is_err());
        assert!(search_args(&["--end", "Il"]).validate().is_err());
        assert!(search_args(&["--start", ""]).validate().is_err());
    }

    #[test]
    fn test_invalid_numbers() {
        assert!(matches!(
            search_args(&["-b", "0"]).validate(),
            Err(ConfigError::InvalidBatchSize)
        ));
        assert!(matches!(
            search_args(&["-w", "0"]).validate(),
            Err(ConfigError::InvalidWorkers)
        ));
    }

    #[test]
    fn test_invalid_prefix_and_program() {
        assert!(search_args(&["--prefix", "p0w"]).validate().is_err());
        assert!(search_args(&["--prefix", "po1"]).validate().is_err());
        assert!(matches!(
            search_args(&["--program-id", "notbase58!"]).validate(),
            Err(ConfigError::InvalidProgramId(_))
        ));
    }

    #[test]
    fn test_stdio_request_options() {
        let args = match parse(&["stdio", "-w", "3", "--prefix", "nft"]).command {
            Command::Stdio(args) => args,
            other => panic!("expected stdio, got {:?}", other),
        };
        assert!(args.validate().is_ok());

        let options = args.search_options(SearchRequest {
            count: 77,
            criteria: Criteria::End("zz".into()),
        });
        assert_eq!(options.batch_size, 77);
        assert_eq!(options.criteria, Criteria::End("zz".into()));
        assert_eq!(options.pow_prefix, "nft");
        assert_eq!(options.threads, Some(3));
        assert_eq!(options.stall_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_subcommands() {
        match parse(&["register", "1029"]).command {
            Command::Register(args) => assert_eq!(args.id, 1029),
            other => panic!("expected register, got {:?}", other),
        }
        match parse(&["decode", "pow12abc"]).command {
            Command::Decode(args) => assert_eq!(args.address, "pow12abc"),
            other => panic!("expected decode, got {:?}", other),
        }
        match parse(&["example", "-n", "3"]).command {
            Command::Example(args) => assert_eq!(args.count, 3),
            other => panic!("expected example, got {:?}", other),
        }
    }
}
