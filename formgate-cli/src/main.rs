use std::fmt::Write as FmtWrite;
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use clap::{ArgAction, Parser, ValueEnum};
use color_eyre::eyre::{Report, Result, WrapErr, eyre};
use serde_json::Value;
use tracing::debug;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use formgate::{
    ArrayOutcome, DocumentFormat, FormConfig, FormEngine, OutputDestination, OutputOptions,
    SchemaValidator, SessionOptions, SessionSnapshot,
    io::{declaration_schema, emit, emit_text},
    parse_document_str,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputMode {
    Json,
    Table,
}

#[derive(Debug, Parser)]
#[command(
    name = "formgate",
    version,
    about = "Resolve field visibility and registration for declarative forms",
    after_help = "Mutations run in this order: --append, --remove, --set."
)]
struct Cli {
    /// Form declaration source: file path, inline payload, or "-" for stdin
    #[arg(
        short = 'f',
        long = "form",
        value_name = "SPEC",
        required_unless_present = "declaration_schema"
    )]
    form: Option<String>,

    /// Initial values source: file path, inline payload, or "-" for stdin
    #[arg(short = 'v', long = "values", alias = "data", value_name = "SPEC")]
    values: Option<String>,

    /// JSON Schema source used to validate the visible values
    #[arg(short = 's', long = "schema", value_name = "SPEC")]
    schema: Option<String>,

    /// Set a value: PATH=JSON (plain text is taken as a string)
    #[arg(long = "set", value_name = "PATH=JSON", action = ArgAction::Append)]
    sets: Vec<String>,

    /// Append a blank item to the field array at PATH
    #[arg(long = "append", value_name = "PATH", action = ArgAction::Append)]
    appends: Vec<String>,

    /// Remove an item: PATH=INDEX
    #[arg(long = "remove", value_name = "PATH=INDEX", action = ArgAction::Append)]
    removes: Vec<String>,

    /// Keep values of fields that become hidden
    #[arg(long = "keep-hidden-values")]
    keep_hidden_values: bool,

    /// Do not pad visible field arrays up to their minimum
    #[arg(long = "no-pad")]
    no_pad: bool,

    #[arg(long = "output", value_enum, default_value = "json")]
    output: OutputMode,

    /// Write to these files instead of stdout ("-" writes to stdout)
    #[arg(short = 'o', long = "out", value_name = "DEST", num_args = 1.., action = ArgAction::Append)]
    outs: Vec<String>,

    /// Emit compact JSON/TOML rather than pretty formatting
    #[arg(long = "no-pretty")]
    no_pretty: bool,

    /// Print the JSON Schema of declaration documents and exit
    #[arg(long = "declaration-schema")]
    declaration_schema: bool,

    /// Increase log verbosity (once for debug, twice for trace); RUST_LOG overrides
    #[arg(long = "verbose", action = ArgAction::Count)]
    verbose: u8,
}

#[derive(Debug)]
enum InputSource {
    File(PathBuf),
    Stdin,
}

fn main() -> Result<()> {
    color_eyre::install()?;
    formgate::silence_predicate_panics();
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let mut diagnostics = DiagnosticCollector::default();
    let (destinations, out_format) = build_destinations(&cli, &mut diagnostics);

    if cli.declaration_schema {
        diagnostics.into_result()?;
        let options = output_options(&cli, out_format, destinations);
        return emit(&declaration_schema(), &options).map_err(Report::msg);
    }

    let specs = [
        ("form", cli.form.as_deref()),
        ("values", cli.values.as_deref()),
        ("schema", cli.schema.as_deref()),
    ];
    let stdin_users: Vec<&str> = specs
        .iter()
        .filter(|(_, spec)| *spec == Some("-"))
        .map(|(label, _)| *label)
        .collect();
    if stdin_users.len() > 1 {
        diagnostics.push_input(
            &stdin_users.join("/"),
            "only one input can be read from stdin; provide inline content or files",
        );
    }

    let mut loaded = Vec::with_capacity(specs.len());
    for (label, spec) in specs {
        let resolution = resolve_format_hint(spec, label, &mut diagnostics);
        loaded.push(load_optional_value(
            spec,
            resolution.format,
            label,
            resolution.blocked || stdin_users.len() > 1,
            &mut diagnostics,
        ));
    }
    let sets = parse_assignments(&cli.sets, "set", &mut diagnostics, |raw| {
        Ok(serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string())))
    });
    let removes = parse_assignments(&cli.removes, "remove", &mut diagnostics, |raw| {
        raw.parse::<usize>()
            .map_err(|err| format!("'{raw}' is not an item index: {err}"))
    });
    diagnostics.into_result()?;

    let mut loaded = loaded.into_iter();
    let (form, values, schema) = (
        loaded.next().flatten(),
        loaded.next().flatten(),
        loaded.next().flatten(),
    );
    let form = form.ok_or_else(|| eyre!("--form is required"))?;
    let config = FormConfig::from_value(&form).wrap_err("invalid form declaration")?;
    let validator = schema
        .as_ref()
        .map(SchemaValidator::new)
        .transpose()
        .map_err(Report::msg)?;

    let options = SessionOptions::default()
        .with_discard_hidden_values(!cli.keep_hidden_values)
        .with_pad_arrays_to_min(!cli.no_pad);
    let mut session = FormEngine::new(config)
        .with_values(values.unwrap_or(Value::Null))
        .with_options(options)
        .start()?;

    for array in &cli.appends {
        report_outcome("append to", array, session.append_item(array, None)?);
    }
    for (array, index) in removes {
        let outcome = session.remove_item(&array, index)?;
        report_outcome("remove from", &array, outcome);
    }
    for (path, value) in sets {
        let report = session.set_value(&path, value)?;
        debug!(
            path = %path,
            registered = report.registered.len(),
            unregistered = report.unregistered.len(),
            "applied --set"
        );
    }

    let snapshot = SessionSnapshot::capture(&session, validator.as_ref())?;
    match cli.output {
        OutputMode::Json => {
            let options = output_options(&cli, out_format, destinations);
            emit(&serde_json::to_value(&snapshot)?, &options).map_err(Report::msg)?;
        }
        OutputMode::Table => {
            emit_text(&snapshot.render_table(), &destinations).map_err(Report::msg)?;
        }
    }

    if let Some(report) = &snapshot.validation
        && !report.success
    {
        return Err(eyre!("validation failed with {} issue(s)", report.issue_count()));
    }
    Ok(())
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("formgate={level}")));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(filter)
        .init();
}

fn report_outcome(action: &str, array: &str, outcome: ArrayOutcome) {
    if let ArrayOutcome::Rejected(reason) = outcome {
        eprintln!("cannot {action} '{array}': {reason}");
    }
}

fn output_options(
    cli: &Cli,
    format: DocumentFormat,
    destinations: Vec<OutputDestination>,
) -> OutputOptions {
    OutputOptions::new(format)
        .with_pretty(!cli.no_pretty)
        .with_destinations(destinations)
}

fn parse_assignments<T>(
    raw: &[String],
    label: &str,
    diagnostics: &mut DiagnosticCollector,
    parse: impl Fn(&str) -> Result<T, String>,
) -> Vec<(String, T)> {
    let mut parsed = Vec::with_capacity(raw.len());
    for entry in raw {
        let Some((path, value)) = entry.split_once('=') else {
            diagnostics.push_input(label, format!("'{entry}' is not of the form PATH=VALUE"));
            continue;
        };
        if path.trim().is_empty() {
            diagnostics.push_input(label, format!("'{entry}' has an empty path"));
            continue;
        }
        match parse(value) {
            Ok(value) => parsed.push((path.trim().to_string(), value)),
            Err(message) => diagnostics.push_input(label, message),
        }
    }
    parsed
}

#[derive(Debug, Clone, Copy, Default)]
struct FormatResolution {
    format: DocumentFormat,
    blocked: bool,
}

fn resolve_format_hint(
    path_hint: Option<&str>,
    label: &str,
    diagnostics: &mut DiagnosticCollector,
) -> FormatResolution {
    if let Some(path) = path_hint
        && path != "-"
    {
        match detect_format_from_extension(Path::new(path)) {
            ExtensionFormat::Known(format) => {
                return FormatResolution {
                    format,
                    blocked: false,
                };
            }
            ExtensionFormat::UnsupportedFeature {
                format_name,
                feature_flag,
            } => {
                diagnostics.push_input(
                    label,
                    format!(
                        "{label} '{path}' requires {format_name} support, but this build lacks the '{feature_flag}' feature"
                    ),
                );
                return FormatResolution {
                    format: DocumentFormat::default(),
                    blocked: true,
                };
            }
            ExtensionFormat::Unknown => {}
        }
    }
    FormatResolution::default()
}

fn load_optional_value(
    spec: Option<&str>,
    format: DocumentFormat,
    label: &str,
    skip: bool,
    diagnostics: &mut DiagnosticCollector,
) -> Option<Value> {
    if skip {
        return None;
    }
    let raw = spec?;
    match load_value(raw, format, label) {
        Ok(value) => Some(value),
        Err(err) => {
            diagnostics.push_input(label, err.to_string());
            None
        }
    }
}

fn load_value(spec: &str, format: DocumentFormat, label: &str) -> Result<Value> {
    if spec == "-" {
        let contents = read_from_source(&InputSource::Stdin)?;
        return parse_contents(&contents, format, label);
    }

    let path = PathBuf::from(spec);
    if !path.exists() {
        let inline_label = format!("inline {label}");
        return parse_contents(spec, format, &inline_label);
    }
    let contents = read_from_source(&InputSource::File(path.clone()))
        .wrap_err_with(|| format!("failed to load {label} from {}", path.display()))?;
    parse_contents(&contents, format, label)
}

fn read_from_source(source: &InputSource) -> Result<String> {
    match source {
        InputSource::Stdin => {
            let mut buffer = String::new();
            io::stdin()
                .read_to_string(&mut buffer)
                .wrap_err("failed to read from stdin")?;
            Ok(buffer)
        }
        InputSource::File(path) => fs::read_to_string(path)
            .wrap_err_with(|| format!("failed to read file {}", path.display())),
    }
}

fn parse_contents(contents: &str, format: DocumentFormat, label: &str) -> Result<Value> {
    match parse_document_str(contents, format) {
        Ok(value) => Ok(value),
        Err(primary) => {
            for candidate in DocumentFormat::available_formats() {
                if candidate == format {
                    continue;
                }
                if let Ok(value) = parse_document_str(contents, candidate) {
                    return Ok(value);
                }
            }
            Err(Report::msg(format!(
                "failed to parse {label}: tried {} (first error: {primary})",
                format_list()
            )))
        }
    }
}

fn format_list() -> String {
    let items: Vec<String> = DocumentFormat::available_formats()
        .into_iter()
        .map(|fmt| fmt.to_string())
        .collect();
    items.join(", ")
}

#[derive(Default)]
struct DiagnosticCollector {
    messages: Vec<String>,
}

impl DiagnosticCollector {
    fn push_input(&mut self, label: &str, message: impl Into<String>) {
        self.messages
            .push(format!("input ({label}): {}", message.into()));
    }

    fn push_output(&mut self, message: impl Into<String>) {
        self.messages.push(format!("output: {}", message.into()));
    }

    fn into_result(self) -> Result<()> {
        if self.messages.is_empty() {
            return Ok(());
        }
        let mut body = String::from("encountered input/output issues:\n");
        for (idx, msg) in self.messages.iter().enumerate() {
            let _ = writeln!(body, "  {}. {}", idx + 1, msg);
        }
        Err(eyre!(body))
    }
}

/// Destinations plus the serialization format their file extensions agree on.
fn build_destinations(
    cli: &Cli,
    diagnostics: &mut DiagnosticCollector,
) -> (Vec<OutputDestination>, DocumentFormat) {
    let mut destinations = Vec::new();
    let mut detected: Option<DocumentFormat> = None;
    for raw in &cli.outs {
        if raw.trim().is_empty() {
            diagnostics.push_output("output destination cannot be empty");
            continue;
        }
        if raw == "-" {
            destinations.push(OutputDestination::Stdout);
            continue;
        }
        let path = PathBuf::from(raw);
        if cli.output == OutputMode::Json {
            match detect_format_from_extension(&path) {
                ExtensionFormat::Known(format) => match detected {
                    Some(existing) if existing != format => diagnostics.push_output(format!(
                        "output file {} uses {format} but other destinations use {existing}; align extensions",
                        path.display()
                    )),
                    Some(_) => {}
                    None => detected = Some(format),
                },
                ExtensionFormat::UnsupportedFeature {
                    format_name,
                    feature_flag,
                } => diagnostics.push_output(format!(
                    "output file {} requires {format_name} support, but this build was compiled without the '{feature_flag}' feature",
                    path.display()
                )),
                ExtensionFormat::Unknown => {}
            }
        }
        destinations.push(OutputDestination::File(path));
    }
    if destinations.is_empty() {
        destinations.push(OutputDestination::Stdout);
    }
    (destinations, detected.unwrap_or_default())
}

fn detect_format_from_extension(path: &Path) -> ExtensionFormat {
    let Some(ext) = path.extension() else {
        return ExtensionFormat::Unknown;
    };
    let normalized = ext.to_string_lossy().to_ascii_lowercase();
    match normalized.as_str() {
        "json" => ExtensionFormat::Known(DocumentFormat::Json),
        #[cfg(feature = "yaml")]
        "yaml" | "yml" => ExtensionFormat::Known(DocumentFormat::Yaml),
        #[cfg(not(feature = "yaml"))]
        "yaml" | "yml" => ExtensionFormat::UnsupportedFeature {
            format_name: "yaml",
            feature_flag: "yaml",
        },
        #[cfg(feature = "toml")]
        "toml" => ExtensionFormat::Known(DocumentFormat::Toml),
        #[cfg(not(feature = "toml"))]
        "toml" => ExtensionFormat::UnsupportedFeature {
            format_name: "toml",
            feature_flag: "toml",
        },
        _ => ExtensionFormat::Unknown,
    }
}

#[derive(Debug)]
enum ExtensionFormat {
    Known(DocumentFormat),
    #[allow(dead_code)]
    UnsupportedFeature {
        format_name: &'static str,
        feature_flag: &'static str,
    },
    Unknown,
}
