//! pdftranslate CLI - layout-preserving PDF translation

mod openai;

use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Parser, Subcommand, ValueEnum};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};

use pdftranslate::{
    detect_format_from_path, parse_il, to_json, to_xml, EchoTranslator, Error, JsonFormat,
    PageSelection, ProgressEvent, ProgressMonitor, TranslateResult, TranslationConfig, Translator,
    WatermarkOutputMode,
};

use crate::openai::OpenAITranslator;

/// Exit status for a cancelled run (128 + SIGINT).
const EXIT_CANCELLED: u8 = 130;

#[derive(Parser)]
#[command(name = "pdftranslate")]
#[command(version)]
#[command(about = "Translate PDF documents while keeping their layout", long_about = None)]
#[command(args_conflicts_with_subcommands = true)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    #[command(flatten)]
    translate: TranslateArgs,
}

#[derive(Subcommand)]
enum Commands {
    /// Translate one or more PDF files
    #[command(alias = "t")]
    Translate(TranslateArgs),

    /// Write the parsed intermediate representation as JSON or XML
    Dump {
        /// Input PDF file
        #[arg(value_name = "FILE")]
        input: PathBuf,

        /// Output file (stdout if not specified)
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,

        /// Write XML instead of JSON
        #[arg(long)]
        xml: bool,

        /// Output compact JSON
        #[arg(long)]
        compact: bool,

        /// Page range (e.g., "1-10", "1,3,5")
        #[arg(long)]
        pages: Option<String>,
    },

    /// Show document information
    Info {
        /// Input PDF file
        #[arg(value_name = "FILE")]
        input: PathBuf,
    },

    /// Show version information
    Version,
}

#[derive(Args, Clone)]
struct TranslateArgs {
    /// Input PDF files
    #[arg(value_name = "FILES")]
    files: Vec<PathBuf>,

    /// Source language code
    #[arg(long = "lang-in", short = 'i', default_value = "en")]
    lang_in: String,

    /// Target language code
    #[arg(long = "lang-out", short = 'l', default_value = "zh")]
    lang_out: String,

    /// Pages to translate (e.g., "1,2,4-7,-3")
    #[arg(long, short)]
    pages: Option<String>,

    /// Output directory
    #[arg(long, short, value_name = "DIR", default_value = ".")]
    output: PathBuf,

    /// Directory of substitute TrueType/OpenType fonts
    #[arg(long, value_name = "DIR", env = "PDFTRANSLATE_FONT_DIR")]
    font_dir: Option<PathBuf>,

    /// Dry run: the echo engine returns its input unchanged
    #[arg(long)]
    echo: bool,

    /// Use the OpenAI-compatible chat-completions engine
    #[arg(long)]
    openai: bool,

    #[arg(long, value_name = "MODEL")]
    openai_model: Option<String>,

    #[arg(long, value_name = "URL")]
    openai_base_url: Option<String>,

    #[arg(long, value_name = "KEY", env = "OPENAI_API_KEY", hide_env_values = true)]
    openai_api_key: Option<String>,

    /// Translation requests per second
    #[arg(long, default_value_t = 4)]
    qps: usize,

    /// Which outputs carry the watermark
    #[arg(long, value_enum, default_value = "watermarked")]
    watermark_output_mode: WatermarkMode,

    /// Do not write the monolingual PDF
    #[arg(long)]
    no_mono: bool,

    /// Do not write the bilingual PDF
    #[arg(long)]
    no_dual: bool,

    /// Bilingual PDF alternates pages instead of placing them side by side
    #[arg(long)]
    use_alternating_pages_dual: bool,

    /// Put the translation first in the bilingual PDF
    #[arg(long)]
    dual_translate_first: bool,

    /// Skip the compressing save
    #[arg(long)]
    skip_clean: bool,

    /// Translate paragraphs as plain text without style placeholders
    #[arg(long)]
    disable_rich_text_translate: bool,

    /// Favour compatibility with other PDF readers
    #[arg(long)]
    enhance_compatibility: bool,

    /// Split paragraphs at lines shorter than the factor times the median
    #[arg(long)]
    split_short_lines: bool,

    #[arg(long, default_value_t = 0.8)]
    short_line_split_factor: f32,

    /// Paragraphs shorter than this are left untranslated
    #[arg(long, default_value_t = 5)]
    min_text_length: usize,

    /// Font names matching this pattern hold formulas
    #[arg(long, value_name = "REGEX")]
    formular_font_pattern: Option<String>,

    /// Characters matching this pattern start formulas
    #[arg(long, value_name = "REGEX")]
    formular_char_pattern: Option<String>,

    /// Translation cache database (in memory if not specified)
    #[arg(long, value_name = "FILE", env = "PDFTRANSLATE_CACHE")]
    cache_path: Option<PathBuf>,

    /// Ignore the translation cache
    #[arg(long)]
    ignore_cache: bool,

    /// Directory for debug artifacts
    #[arg(long, value_name = "DIR")]
    working_dir: Option<PathBuf>,

    /// Write debug artifacts and overlays; raises logging to debug
    #[arg(long, short)]
    debug: bool,

    /// Seconds allowed for pruning unused objects
    #[arg(long, default_value_t = 60)]
    subset_timeout: u64,

    /// Seconds allowed for the compressing save
    #[arg(long, default_value_t = 120)]
    save_timeout: u64,
}

#[derive(Clone, Copy, Default, ValueEnum)]
enum WatermarkMode {
    #[default]
    Watermarked,
    #[value(name = "no_watermark")]
    NoWatermark,
    Both,
}

impl From<WatermarkMode> for WatermarkOutputMode {
    fn from(mode: WatermarkMode) -> Self {
        match mode {
            WatermarkMode::Watermarked => WatermarkOutputMode::Watermarked,
            WatermarkMode::NoWatermark => WatermarkOutputMode::NoWatermark,
            WatermarkMode::Both => WatermarkOutputMode::Both,
        }
    }
}

fn init_logging(debug: bool) {
    let default = if debug { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default)).init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let debug = match &cli.command {
        Some(Commands::Translate(args)) => args.debug,
        None => cli.translate.debug,
        _ => false,
    };
    init_logging(debug);

    let result = match cli.command {
        Some(Commands::Translate(args)) => cmd_translate(&args),
        Some(Commands::Dump {
            input,
            output,
            xml,
            compact,
            pages,
        }) => cmd_dump(&input, output.as_deref(), xml, compact, pages.as_deref()),
        Some(Commands::Info { input }) => cmd_info(&input),
        Some(Commands::Version) => {
            cmd_version();
            Ok(())
        }
        None => {
            if cli.translate.files.is_empty() {
                println!("{}", "Usage: pdftranslate <FILES>... --font-dir <DIR> --openai".yellow());
                println!("       pdftranslate --help for more information");
                Ok(())
            } else {
                cmd_translate(&cli.translate)
            }
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) if e.is_cancelled() => {
            eprintln!("{}", "Cancelled".yellow().bold());
            ExitCode::from(EXIT_CANCELLED)
        }
        Err(e) => {
            eprintln!("{}: {}", "Error".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

fn build_translator(args: &TranslateArgs) -> pdftranslate::Result<Arc<dyn Translator>> {
    match (args.echo, args.openai) {
        (true, true) => Err(Error::Config("choose one of --echo and --openai".into())),
        (true, false) => Ok(Arc::new(EchoTranslator)),
        (false, true) => Ok(Arc::new(OpenAITranslator::new(
            args.openai_base_url.clone(),
            args.openai_api_key.clone().unwrap_or_default(),
            args.openai_model.clone(),
            args.lang_out.clone(),
        )?)),
        (false, false) => Err(Error::Config(
            "no translation engine selected (use --openai or --echo)".into(),
        )),
    }
}

fn build_config(
    args: &TranslateArgs,
    input: &Path,
    translator: Arc<dyn Translator>,
    pages: &PageSelection,
) -> TranslationConfig {
    let mut config = TranslationConfig::new(input, &args.lang_in, &args.lang_out, translator)
        .with_pages(pages.clone())
        .with_output_dir(&args.output)
        .with_debug(args.debug)
        .with_outputs(!args.no_mono, !args.no_dual)
        .with_qps(args.qps)
        .with_watermark_mode(args.watermark_output_mode.into())
        .with_alternating_pages_dual(args.use_alternating_pages_dual)
        .with_dual_translate_first(args.dual_translate_first)
        .with_skip_clean(args.skip_clean)
        .with_rich_text_disabled(args.disable_rich_text_translate)
        .with_short_line_split(args.split_short_lines, args.short_line_split_factor)
        .with_min_text_length(args.min_text_length)
        .with_ignore_cache(args.ignore_cache)
        .with_timeouts(
            Duration::from_secs(args.subset_timeout),
            Duration::from_secs(args.save_timeout),
        )
        .with_enhance_compatibility(args.enhance_compatibility);
    if let Some(dir) = &args.font_dir {
        config = config.with_font_dir(dir);
    }
    if let Some(pattern) = &args.formular_font_pattern {
        config = config.with_formula_font_pattern(pattern);
    }
    if let Some(pattern) = &args.formular_char_pattern {
        config = config.with_formula_char_pattern(pattern);
    }
    if let Some(path) = &args.cache_path {
        config = config.with_cache_path(path);
    }
    if let Some(dir) = &args.working_dir {
        config = config.with_working_dir(dir);
    }
    config
}

fn progress_bar(file: &Path) -> ProgressBar {
    let pb = ProgressBar::new(100);
    let style = ProgressStyle::default_bar()
        .template("{spinner:.green} {prefix} [{bar:40.cyan/blue}] {pos:>3}% {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("#>-");
    pb.set_style(style);
    pb.set_prefix(file.display().to_string());
    pb
}

fn attach_progress(monitor: &ProgressMonitor, pb: &ProgressBar) {
    let pb = pb.clone();
    monitor.subscribe(move |event| match event {
        ProgressEvent::ProgressStart(status) | ProgressEvent::ProgressUpdate(status) => {
            pb.set_position(status.overall_progress.round() as u64);
            pb.set_message(format!(
                "{} ({}/{})",
                status.stage, status.stage_current, status.stage_total
            ));
        }
        ProgressEvent::ProgressEnd(status) => {
            pb.set_position(status.overall_progress.round() as u64);
        }
        ProgressEvent::Finish { .. } => pb.finish_with_message("Done!"),
        ProgressEvent::Error { error } => pb.abandon_with_message(error.clone()),
        ProgressEvent::StageSummary { .. } => {}
    });
}

fn cmd_translate(args: &TranslateArgs) -> pdftranslate::Result<()> {
    if args.files.is_empty() {
        return Err(Error::Config("no input files given".into()));
    }
    let translator = build_translator(args)?;
    let pages = match &args.pages {
        Some(p) => PageSelection::parse(p)?,
        None => PageSelection::All,
    };

    // Reject every missing input before any page work starts.
    for file in &args.files {
        if !file.is_file() {
            return Err(Error::Config(format!("input file does not exist: {}", file.display())));
        }
    }

    for file in &args.files {
        let monitor = Arc::new(ProgressMonitor::for_translation());
        let pb = progress_bar(file);
        attach_progress(&monitor, &pb);

        let config = build_config(args, file, Arc::clone(&translator), &pages).with_progress(monitor);
        let result = pdftranslate::translate(&config)?;
        print_result(&result);
    }
    Ok(())
}

fn print_result(result: &TranslateResult) {
    println!("\n{}", "Output files:".green().bold());
    let mut outputs = vec![
        ("mono", &result.mono_pdf_path),
        ("dual", &result.dual_pdf_path),
    ];
    if result.no_watermark_mono_pdf_path != result.mono_pdf_path {
        outputs.push(("mono, no watermark", &result.no_watermark_mono_pdf_path));
    }
    if result.no_watermark_dual_pdf_path != result.dual_pdf_path {
        outputs.push(("dual, no watermark", &result.no_watermark_dual_pdf_path));
    }
    let written: Vec<_> = outputs
        .into_iter()
        .filter_map(|(label, path)| path.as_ref().map(|p| (label, p)))
        .collect();
    for (i, (label, path)) in written.iter().enumerate() {
        let branch = if i + 1 == written.len() { "└─" } else { "├─" };
        println!("  {} {} {}", branch.dimmed(), path.display(), format!("({})", label).dimmed());
    }
    println!("{} {:.2}s", "Total time:".bold(), result.total_seconds);
}

fn cmd_dump(
    input: &Path,
    output: Option<&Path>,
    xml: bool,
    compact: bool,
    pages: Option<&str>,
) -> pdftranslate::Result<()> {
    let page_selection = match pages {
        Some(p) => PageSelection::parse(p)?,
        None => PageSelection::All,
    };
    let config = TranslationConfig::new(input, "", "", Arc::new(EchoTranslator)).with_pages(page_selection);
    let doc = parse_il(input, &config)?;

    let text = if xml {
        to_xml(&doc)?
    } else {
        let format = if compact {
            JsonFormat::Compact
        } else {
            JsonFormat::Pretty
        };
        to_json(&doc, format)?
    };

    if let Some(path) = output {
        fs::write(path, &text)?;
        println!("{} {}", "Saved to".green(), path.display());
    } else {
        println!("{}", text);
    }
    Ok(())
}

fn cmd_info(input: &Path) -> pdftranslate::Result<()> {
    let format = detect_format_from_path(input)?;
    let config = TranslationConfig::new(input, "", "", Arc::new(EchoTranslator));
    let doc = parse_il(input, &config)?;

    println!("{}", "Document Information".cyan().bold());
    println!("{}", "─".repeat(40).dimmed());
    println!("{}: {}", "File".bold(), input.display());
    println!("{}: {}", "Format".bold(), format);
    println!("{}: {}", "Pages".bold(), doc.total_pages);
    println!("{}: {}", "Parsed pages".bold(), doc.page_count());

    println!();
    println!("{}", "Content Statistics".cyan().bold());
    println!("{}", "─".repeat(40).dimmed());
    let chars: usize = doc.page.iter().map(|p| p.pdf_character.len()).sum();
    let fonts: usize = doc.page.iter().map(|p| p.pdf_font.len()).sum();
    let xobjects: usize = doc.page.iter().map(|p| p.pdf_xobject.len()).sum();
    let figures: usize = doc.page.iter().map(|p| p.pdf_figure.len()).sum();
    println!("{}: {}", "Characters".bold(), chars);
    println!("{}: {}", "Fonts".bold(), fonts);
    println!("{}: {}", "Form XObjects".bold(), xobjects);
    println!("{}: {}", "Figures".bold(), figures);
    Ok(())
}

fn cmd_version() {
    println!("{} {}", "pdftranslate".cyan().bold(), env!("CARGO_PKG_VERSION"));
    println!("Layout-preserving PDF translation");
    println!();
    println!("Library: {}", pdftranslate::VERSION);
    println!("License: MIT");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(extra: &[&str]) -> TranslateArgs {
        let mut argv = vec!["pdftranslate", "translate", "paper.pdf"];
        argv.extend_from_slice(extra);
        match Cli::try_parse_from(argv).unwrap().command {
            Some(Commands::Translate(args)) => args,
            _ => panic!("expected translate"),
        }
    }

    #[test]
    fn test_no_engine_is_config_error() {
        let err = build_translator(&args(&[])).err().unwrap();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_echo_engine() {
        let translator = build_translator(&args(&["--echo"])).unwrap();
        assert_eq!(translator.name(), "echo");
        assert!(build_translator(&args(&["--echo", "--openai"])).is_err());
    }

    #[test]
    fn test_missing_input_rejected_before_work() {
        let err = cmd_translate(&args(&["--echo"])).unwrap_err();
        assert!(err.to_string().contains("does not exist"));
    }

    #[test]
    fn test_config_from_flags() {
        let a = args(&[
            "--echo",
            "--pages",
            "1-3",
            "--watermark-output-mode",
            "no_watermark",
            "--qps",
            "8",
            "--enhance-compatibility",
        ]);
        let translator = build_translator(&a).unwrap();
        let pages = PageSelection::parse(a.pages.as_deref().unwrap()).unwrap();
        let config = build_config(&a, Path::new("paper.pdf"), translator, &pages);
        assert_eq!(config.watermark_output_mode, WatermarkOutputMode::NoWatermark);
        assert_eq!(config.qps, 8);
        assert!(config.skip_clean && config.disable_rich_text_translate);
        assert!(config.pages.includes(3) && !config.pages.includes(4));
    }

    #[test]
    fn test_dump_rejects_non_pdf() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("not.pdf");
        fs::write(&input, b"hello").unwrap();
        assert!(cmd_dump(&input, Some(&dir.path().join("out.json")), false, false, None).is_err());
    }
}
