use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "docbox",
    about = "docbox — collision-free document storage on S3-compatible buckets",
    version,
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// TOML file with credentials and options. Falls back to DOCBOX_* variables.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Write a conditional put per candidate key instead of probing.
    #[arg(long, global = true)]
    pub conditional: bool,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Debug, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Upload a local file without overwriting existing objects
    Upload(UploadArgs),
    /// Download an object
    Get(GetArgs),
    /// Show an object's metadata
    Head(HeadArgs),
    /// List objects in the bucket
    List(ListArgs),
    /// Delete an object
    Delete(DeleteArgs),
    /// Rename an object without overwriting the destination
    Rename(RenameArgs),
    /// Finish a rename that left both objects behind
    Reconcile(ReconcileArgs),
}

#[derive(Args)]
pub struct UploadArgs {
    pub path: PathBuf,
    /// Desired key. Defaults to the file name.
    #[arg(short, long)]
    pub key: Option<String>,
    /// Metadata entry, `name=value`. Repeatable.
    #[arg(short, long = "meta")]
    pub meta: Vec<String>,
    /// Content identifier stored as the `cid` metadata field.
    #[arg(long)]
    pub cid: Option<String>,
    #[arg(long)]
    pub content_type: Option<String>,
}

#[derive(Args)]
pub struct GetArgs {
    pub key: String,
    /// Write the content to this file instead of printing base64.
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

#[derive(Args)]
pub struct HeadArgs {
    pub key: String,
}

#[derive(Args)]
pub struct ListArgs {
    /// Follow pagination past the first 1000 objects.
    #[arg(short, long)]
    pub all: bool,
}

#[derive(Args)]
pub struct DeleteArgs {
    pub key: String,
}

#[derive(Args)]
pub struct RenameArgs {
    pub old_key: String,
    pub new_key: String,
}

#[derive(Args)]
pub struct ReconcileArgs {
    pub old_key: String,
    pub final_key: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_upload() {
        let cli = Cli::try_parse_from(["docbox", "upload", "report.pdf"]).unwrap();
        if let Command::Upload(args) = cli.command {
            assert_eq!(args.path, PathBuf::from("report.pdf"));
            assert!(args.key.is_none());
            assert!(args.meta.is_empty());
        } else { panic!("wrong command"); }
    }

    #[test]
    fn parse_upload_with_metadata() {
        let cli = Cli::try_parse_from([
            "docbox", "upload", "r.pdf", "--key", "reports/r.pdf",
            "--meta", "owner=ops", "-m", "team=docs", "--cid", "bafy",
        ])
        .unwrap();
        if let Command::Upload(args) = cli.command {
            assert_eq!(args.key, Some("reports/r.pdf".into()));
            assert_eq!(args.meta, vec!["owner=ops", "team=docs"]);
            assert_eq!(args.cid, Some("bafy".into()));
        } else { panic!("wrong command"); }
    }

    #[test]
    fn parse_get_output() {
        let cli = Cli::try_parse_from(["docbox", "get", "a.pdf", "-o", "/tmp/a.pdf"]).unwrap();
        if let Command::Get(args) = cli.command {
            assert_eq!(args.key, "a.pdf");
            assert_eq!(args.output, Some(PathBuf::from("/tmp/a.pdf")));
        } else { panic!("wrong command"); }
    }

    #[test]
    fn parse_list_all() {
        let cli = Cli::try_parse_from(["docbox", "list", "--all"]).unwrap();
        if let Command::List(args) = cli.command {
            assert!(args.all);
        } else { panic!("wrong command"); }
    }

    #[test]
    fn parse_rename() {
        let cli = Cli::try_parse_from(["docbox", "rename", "a.pdf", "b.pdf"]).unwrap();
        if let Command::Rename(args) = cli.command {
            assert_eq!(args.old_key, "a.pdf");
            assert_eq!(args.new_key, "b.pdf");
        } else { panic!("wrong command"); }
    }

    #[test]
    fn rename_requires_both_keys() {
        assert!(Cli::try_parse_from(["docbox", "rename", "a.pdf"]).is_err());
    }

    #[test]
    fn parse_reconcile() {
        let cli = Cli::try_parse_from(["docbox", "reconcile", "a.pdf", "b(1).pdf"]).unwrap();
        assert!(matches!(cli.command, Command::Reconcile(_)));
    }

    #[test]
    fn parse_global_flags() {
        let cli = Cli::try_parse_from([
            "docbox", "delete", "a.pdf", "--config", "docbox.toml", "--format", "json", "-v",
            "--conditional",
        ])
        .unwrap();
        assert!(cli.verbose);
        assert!(cli.conditional);
        assert!(matches!(cli.format, OutputFormat::Json));
        assert_eq!(cli.config, Some(PathBuf::from("docbox.toml")));
    }
}
