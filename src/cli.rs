//! # Command-Line Interface
//!
//! Argument definitions for the `promptforge` binary. Handlers live in
//! `commands.rs`.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    name = "promptforge",
    version,
    about = "Optimize text prompts through configurable templates and LLM providers"
)]
pub struct Cli {
    /// Path to the configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// API key, overriding the stored credential for this invocation
    #[arg(short = 'k', long, global = true, value_name = "KEY")]
    pub api_key: Option<String>,

    /// Template name
    #[arg(short = 't', long, global = true, value_name = "NAME")]
    pub template: Option<String>,

    /// Model identifier (provider/model-name)
    #[arg(short = 'm', long, global = true, value_name = "ID")]
    pub model: Option<String>,

    /// Output directory for processed files
    #[arg(short = 'o', long, global = true, value_name = "DIR")]
    pub output: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Optimize a single text prompt and print the result
    Process {
        /// The prompt text to optimize
        text: String,
    },
    /// Optimize one file into the output directory
    File {
        /// The file to process
        path: PathBuf,
    },
    /// Optimize every matching file in a directory
    Dir {
        /// The directory to process
        path: PathBuf,
        /// Do not descend into subdirectories
        #[arg(long)]
        no_recursive: bool,
        /// Comma-separated extensions to process; an empty value matches all
        #[arg(long, value_delimiter = ',', default_value = ".md")]
        extensions: Vec<String>,
        /// Continue the most recent unfinished batch over this directory
        #[arg(long)]
        resume: bool,
    },
    /// List available prompt templates
    Templates {
        /// Template directory to list instead of the configured one
        #[arg(long, value_name = "DIR")]
        dir: Option<PathBuf>,
    },
    /// List models available from configured providers
    Models {
        /// Restrict the listing to one provider id
        #[arg(long, value_name = "ID")]
        provider: Option<String>,
        /// Bypass the on-disk model cache
        #[arg(long)]
        refresh: bool,
    },
    /// Read or write configuration values
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Debug, Subcommand)]
pub enum ConfigAction {
    /// Print the value stored at a dotted-path key
    Get { key: String },
    /// Set a dotted-path key; the value is parsed as JSON when possible
    Set { key: String, value: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn dir_extensions_split_on_commas() {
        let cli = Cli::try_parse_from([
            "promptforge",
            "dir",
            "input",
            "--extensions",
            ".md,.txt",
        ])
        .unwrap();
        match cli.command {
            Command::Dir { extensions, no_recursive, resume, .. } => {
                assert_eq!(extensions, vec![".md", ".txt"]);
                assert!(!no_recursive);
                assert!(!resume);
            }
            _ => panic!("expected dir subcommand"),
        }
    }

    #[test]
    fn global_flags_apply_after_subcommand() {
        let cli = Cli::try_parse_from([
            "promptforge",
            "process",
            "hello",
            "--model",
            "openai/gpt-4.1",
        ])
        .unwrap();
        assert_eq!(cli.model.as_deref(), Some("openai/gpt-4.1"));
    }
}
