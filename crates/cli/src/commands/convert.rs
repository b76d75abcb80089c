use super::{print_report, ViewArg};
use anyhow::{Context, Result};
use clap::Args;
use session::DocumentSession;
use store::{EditorSettings, Format};
use std::path::PathBuf;

#[derive(Args, Debug)]
pub struct ConvertArgs {
    /// Input document
    pub input: PathBuf,

    /// Output document; the extension picks the format
    pub output: PathBuf,

    /// View of pending changes to write (default from settings)
    #[arg(long, value_enum)]
    pub view: Option<ViewArg>,
}

pub fn convert(args: ConvertArgs, settings: EditorSettings) -> Result<()> {
    let output_format = Format::from_path(&args.output)
        .with_context(|| format!("Cannot tell the output format of {}", args.output.display()))?;

    let (mut session, import_report) = DocumentSession::open(&args.input, settings)
        .with_context(|| format!("Failed to read {}", args.input.display()))?;
    print_report("Import", &import_report);

    let export_report = session
        .save_as(&args.output, args.view.map(Into::into))
        .with_context(|| format!("Failed to write {}", args.output.display()))?;
    print_report("Export", &export_report);

    println!(
        "Converted {} -> {} ({})",
        args.input.display(),
        args.output.display(),
        output_format
    );
    Ok(())
}
