use std::path::Path;

use anyhow::{anyhow, Context};
use colored::Colorize;
use serde::Serialize;
use tracing::debug;

use docbox_sdk::{
    AllocationStrategy, ClientConfig, ClientOptions, DocBox, FileConfig, ReconcileOutcome,
    UploadOptions,
};
use docbox_types::{Envelope, Failure, FailureKind, Metadata};

use crate::cli::*;

/// Run one command. Returns whether the operation succeeded.
pub async fn run_command(cli: Cli) -> anyhow::Result<bool> {
    let docbox = connect(cli.config.as_deref(), cli.conditional)?;
    let format = cli.format;
    match cli.command {
        Command::Upload(args) => cmd_upload(&docbox, &format, args).await,
        Command::Get(args) => cmd_get(&docbox, &format, args).await,
        Command::Head(args) => cmd_head(&docbox, &format, args).await,
        Command::List(args) => cmd_list(&docbox, &format, args).await,
        Command::Delete(args) => {
            let envelope = docbox.delete(&args.key).await;
            report(&format, &envelope, |_| {})
        }
        Command::Rename(args) => cmd_rename(&docbox, &format, args).await,
        Command::Reconcile(args) => cmd_reconcile(&docbox, &format, args).await,
    }
}

fn connect(config_path: Option<&Path>, conditional: bool) -> anyhow::Result<DocBox> {
    let (config, mut options) = load_config(config_path)?;
    if conditional {
        options.strategy = AllocationStrategy::ConditionalPut;
    }
    debug!(bucket = %config.bucket_name, ?options, "connecting");
    Ok(DocBox::connect_with_options(&config, options)?)
}

fn load_config(path: Option<&Path>) -> anyhow::Result<(ClientConfig, ClientOptions)> {
    match path {
        Some(path) => {
            let file = FileConfig::from_file(path)
                .with_context(|| format!("loading {}", path.display()))?;
            Ok((file.client, file.options))
        }
        None => Ok((
            ClientConfig::from_env().context("no --config given")?,
            ClientOptions::default(),
        )),
    }
}

async fn cmd_upload(docbox: &DocBox, format: &OutputFormat, args: UploadArgs) -> anyhow::Result<bool> {
    let key = match args.key {
        Some(key) => key,
        None => default_key(&args.path)?,
    };
    let options = UploadOptions {
        content_type: args.content_type,
        metadata: build_metadata(&args.meta, args.cid)?,
    };
    let envelope = docbox.upload_with(&args.path, &key, options).await;
    report(format, &envelope, |receipt| {
        if receipt.final_key != key {
            println!("  {} {} was taken", "note:".yellow(), key);
        }
        println!("  Key:      {}", receipt.final_key.bold());
        println!("  Location: {}", receipt.location.blue());
        println!("  Size:     {} bytes", receipt.size);
    })
}

async fn cmd_get(docbox: &DocBox, format: &OutputFormat, args: GetArgs) -> anyhow::Result<bool> {
    match args.output {
        Some(path) => {
            let envelope = docbox.download(&args.key, &path).await;
            report(format, &envelope, |_| {})
        }
        None => {
            let envelope = docbox.get(&args.key).await;
            report(format, &envelope, |download| println!("{}", download.content_base64))
        }
    }
}

async fn cmd_head(docbox: &DocBox, format: &OutputFormat, args: HeadArgs) -> anyhow::Result<bool> {
    let envelope = docbox.head(&args.key).await;
    report(format, &envelope, |head| {
        println!("{}", head.key.bold());
        println!("  Size:          {} bytes", head.size);
        if let Some(content_type) = &head.content_type {
            println!("  Content-Type:  {content_type}");
        }
        if let Some(modified) = &head.last_modified {
            println!("  Last-Modified: {}", modified.to_rfc3339());
        }
        if let Some(e_tag) = &head.e_tag {
            println!("  ETag:          {}", e_tag.dimmed());
        }
        for (name, value) in head.metadata.iter() {
            println!("  {}: {}", name.cyan(), value);
        }
    })
}

async fn cmd_list(docbox: &DocBox, format: &OutputFormat, args: ListArgs) -> anyhow::Result<bool> {
    let envelope = if args.all {
        docbox.list_all().await
    } else {
        docbox.list().await
    };
    report(format, &envelope, |objects| {
        if objects.is_empty() {
            println!("No objects.");
            return;
        }
        for object in objects {
            let modified = object
                .last_modified
                .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
                .unwrap_or_default();
            println!("{:>12}  {:19}  {}", object.size, modified.dimmed(), object.key);
        }
        println!("{} objects", objects.len().to_string().bold());
    })
}

async fn cmd_rename(docbox: &DocBox, format: &OutputFormat, args: RenameArgs) -> anyhow::Result<bool> {
    let envelope = docbox.rename(&args.old_key, &args.new_key).await;
    let success = report(format, &envelope, |receipt| {
        if receipt.final_key != receipt.requested_key {
            println!("  {} {} was taken", "note:".yellow(), receipt.requested_key);
        }
    })?;
    if let (OutputFormat::Text, Some(FailureKind::PartialRename { old_key, final_key })) =
        (format, envelope.kind())
    {
        eprintln!(
            "  Both objects exist. Run `docbox reconcile {old_key} {final_key}` to remove the source."
        );
    }
    Ok(success)
}

async fn cmd_reconcile(
    docbox: &DocBox,
    format: &OutputFormat,
    args: ReconcileArgs,
) -> anyhow::Result<bool> {
    let envelope = docbox.reconcile_rename(&args.old_key, &args.final_key).await;
    report(format, &envelope, |outcome| {
        if *outcome == ReconcileOutcome::CopyMissing {
            println!("  Re-run `docbox rename {} {}`.", args.old_key, args.final_key);
        }
    })
}

/// Print an envelope and return its success flag.
fn report<T: Serialize>(
    format: &OutputFormat,
    envelope: &Envelope<T>,
    render: impl FnOnce(&T),
) -> anyhow::Result<bool> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(envelope)?),
        OutputFormat::Text => match (&envelope.data, &envelope.error) {
            (Some(data), None) => {
                if let Some(message) = &envelope.message {
                    println!("{} {}", "✓".green().bold(), message);
                }
                render(data);
            }
            (_, Some(failure)) => print_failure(failure),
            (None, None) => return Err(anyhow!("empty envelope")),
        },
    }
    Ok(envelope.is_success())
}

fn print_failure(failure: &Failure) {
    eprintln!(
        "{} {} {}",
        "✗".red().bold(),
        format!("[{}]", failure.kind.label()).red(),
        failure.message
    );
}

fn default_key(path: &Path) -> anyhow::Result<String> {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(str::to_string)
        .ok_or_else(|| anyhow!("cannot derive a key from {}; pass --key", path.display()))
}

fn build_metadata(pairs: &[String], cid: Option<String>) -> anyhow::Result<Metadata> {
    let mut metadata = Metadata::new();
    for pair in pairs {
        let (name, value) = Metadata::parse_pair(pair)?;
        metadata.insert(name, value);
    }
    if let Some(cid) = cid {
        metadata = metadata.with_cid(cid);
    }
    Ok(metadata)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn default_key_is_file_name() {
        assert_eq!(default_key(Path::new("/tmp/reports/q3.pdf")).unwrap(), "q3.pdf");
        assert!(default_key(Path::new("/")).is_err());
    }

    #[test]
    fn metadata_from_flags() {
        let metadata = build_metadata(
            &["Owner=ops".to_string(), "team=docs".to_string()],
            Some("bafy".into()),
        )
        .unwrap();
        assert_eq!(metadata.get("owner"), Some("ops"));
        assert_eq!(metadata.get("team"), Some("docs"));
        assert_eq!(metadata.cid(), Some("bafy"));
    }

    #[test]
    fn malformed_metadata_flag() {
        assert!(build_metadata(&["novalue".to_string()], None).is_err());
    }

    #[test]
    fn config_file_options_are_loaded() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "access_key_id = \"AK\"\nsecret_access_key = \"SK\"\nbucket_name = \"docs\"\n\n[options]\nstrategy = \"conditional_put\""
        )
        .unwrap();
        let (config, options) = load_config(Some(file.path())).unwrap();
        assert_eq!(config.bucket_name, "docs");
        assert_eq!(options.strategy, AllocationStrategy::ConditionalPut);
    }

    #[test]
    fn missing_config_file() {
        assert!(load_config(Some(Path::new("/nonexistent/docbox.toml"))).is_err());
    }

    #[test]
    fn json_report_carries_success_flag() {
        let ok = Envelope::ok_with_message((), "done");
        assert!(report(&OutputFormat::Json, &ok, |_| {}).unwrap());
        let failed: Envelope<()> = Envelope::fail(Failure::not_found("a.pdf"));
        assert!(!report(&OutputFormat::Json, &failed, |_| {}).unwrap());
    }
}
