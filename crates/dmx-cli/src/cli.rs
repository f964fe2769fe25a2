use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "dmx",
    about = "DMX: typed topics and associations over a hypergraph store",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Snapshot file of the store (overrides the config file)
    #[arg(long, global = true)]
    pub store: Option<PathBuf>,

    /// TOML config file
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Repeat for more log output
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Create the store and install the core meta topics
    Init,
    /// Define topic and association types from a TOML file
    Define(DefineArgs),
    /// List type definitions
    Types,
    /// Create a topic
    Create(CreateArgs),
    /// Show a topic with its children
    Show(ShowArgs),
    /// List topics related to a topic
    Related(RelatedArgs),
    /// Delete a topic and the children it owns
    Delete(DeleteArgs),
}

#[derive(Args)]
pub struct DefineArgs {
    pub file: PathBuf,
}

#[derive(Args)]
pub struct CreateArgs {
    /// Type uri of the new topic
    #[arg(long = "type")]
    pub type_uri: String,
    /// Simple value, for topics of a simple type
    #[arg(long)]
    pub value: Option<String>,
    /// Topic uri
    #[arg(long)]
    pub uri: Option<String>,
    /// Set a child: KEY=VALUE, or KEY=@ID / KEY=@URI to reference a topic
    #[arg(long = "set", value_name = "KEY=VALUE")]
    pub set: Vec<String>,
    /// Add a child to a many-valued key, same syntax as --set
    #[arg(long = "add", value_name = "KEY=VALUE")]
    pub add: Vec<String>,
}

#[derive(Args)]
pub struct ShowArgs {
    /// Topic id or uri
    pub target: String,
}

#[derive(Args)]
pub struct RelatedArgs {
    pub id: u64,
    #[arg(long)]
    pub assoc_type: Option<String>,
    #[arg(long)]
    pub my_role: Option<String>,
    #[arg(long)]
    pub others_role: Option<String>,
    #[arg(long)]
    pub others_type: Option<String>,
}

#[derive(Args)]
pub struct DeleteArgs {
    pub id: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_init() {
        let cli = Cli::try_parse_from(["dmx", "init"]).unwrap();
        assert!(matches!(cli.command, Command::Init));
        assert_eq!(cli.verbose, 0);
        assert!(cli.store.is_none());
    }

    #[test]
    fn parse_global_flags_after_command() {
        let cli =
            Cli::try_parse_from(["dmx", "types", "--store", "/tmp/x.dmx", "-vv", "--format", "json"])
                .unwrap();
        assert_eq!(cli.store, Some(PathBuf::from("/tmp/x.dmx")));
        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.format, OutputFormat::Json);
    }

    #[test]
    fn parse_create() {
        let cli = Cli::try_parse_from([
            "dmx",
            "create",
            "--type",
            "acme.person",
            "--set",
            "acme.name=Ann",
            "--add",
            "acme.phone=123",
            "--add",
            "acme.phone=456",
        ])
        .unwrap();
        if let Command::Create(args) = cli.command {
            assert_eq!(args.type_uri, "acme.person");
            assert_eq!(args.set, vec!["acme.name=Ann"]);
            assert_eq!(args.add.len(), 2);
            assert!(args.value.is_none());
        } else {
            panic!("wrong command");
        }
    }

    #[test]
    fn parse_related_filters() {
        let cli = Cli::try_parse_from([
            "dmx",
            "related",
            "7",
            "--assoc-type",
            "dmx.core.composition",
            "--others-type",
            "acme.name",
        ])
        .unwrap();
        if let Command::Related(args) = cli.command {
            assert_eq!(args.id, 7);
            assert_eq!(args.assoc_type.as_deref(), Some("dmx.core.composition"));
            assert!(args.my_role.is_none());
            assert_eq!(args.others_type.as_deref(), Some("acme.name"));
        } else {
            panic!("wrong command");
        }
    }

    #[test]
    fn parse_show_by_uri() {
        let cli = Cli::try_parse_from(["dmx", "show", "dmx.core.text"]).unwrap();
        if let Command::Show(args) = cli.command {
            assert_eq!(args.target, "dmx.core.text");
        } else {
            panic!("wrong command");
        }
    }

    #[test]
    fn delete_needs_a_numeric_id() {
        assert!(Cli::try_parse_from(["dmx", "delete", "abc"]).is_err());
    }
}
