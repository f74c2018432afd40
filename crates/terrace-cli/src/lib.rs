use std::ffi::OsString;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};

use clap::error::ErrorKind;
use clap::{Args, Parser, Subcommand, ValueEnum};
use minus::{ExitStrategy, Pager, page_all};
use terrace_domain::{Config, ModuleInstance, Plan, Schemas, State, Target};
use terrace_engine::{BuildOptions, Context, GraphBuilder, ImportTarget};
use terrace_report::{
    ColorChoice, OutputFormat, RenderOptions, render_changes, render_diagnostics, render_graph,
    render_walk,
};

mod error;
mod inputs;

pub use error::CliError;

use inputs::{read_json, read_optional_json, schema_registry};

#[derive(Debug, Parser)]
#[command(name = "terrace", about = "Infrastructure dependency graph builder")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Build the execution graph of a configuration and print it.
    Graph {
        config: PathBuf,
        #[arg(long)]
        state: Option<PathBuf>,
        #[arg(long)]
        schemas: Option<PathBuf>,
        #[arg(long, value_enum, default_value_t = KindArg::Plan)]
        kind: KindArg,
        #[arg(long = "target", value_name = "ADDRESS")]
        targets: Vec<String>,
        #[arg(long = "exclude", value_name = "ADDRESS")]
        excludes: Vec<String>,
        #[arg(long = "import", value_name = "ADDRESS=ID")]
        imports: Vec<String>,
        #[arg(long)]
        no_reduce: bool,
        #[command(flatten)]
        render: RenderFlags,
        #[arg(long, value_enum, default_value_t = FormatArg::Text)]
        format: FormatArg,
    },
    /// Print the changes recorded in a saved plan.
    Show {
        plan: PathBuf,
        #[command(flatten)]
        render: RenderFlags,
        #[arg(long, value_enum, default_value_t = FormatArg::Text)]
        format: FormatArg,
    },
    /// Check a configuration against provider schemas.
    Validate {
        config: PathBuf,
        #[arg(long)]
        schemas: PathBuf,
        #[command(flatten)]
        render: RenderFlags,
        #[arg(long, value_enum, default_value_t = FormatArg::Text)]
        format: FormatArg,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum KindArg {
    Validate,
    Plan,
    Apply,
    Import,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum FormatArg {
    Text,
    Json,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ColorArg {
    Auto,
    Always,
    Never,
}

#[derive(Debug, Clone, Args)]
struct RenderFlags {
    #[arg(long, value_enum, default_value_t = ColorArg::Auto)]
    color: ColorArg,
    #[arg(long)]
    verbose: bool,
}

impl RenderFlags {
    fn render_options(&self, target: &Path) -> RenderOptions {
        RenderOptions {
            color: self.color.into(),
            verbose: self.verbose,
            target: Some(target.display().to_string()),
        }
    }
}

impl From<FormatArg> for OutputFormat {
    fn from(value: FormatArg) -> Self {
        match value {
            FormatArg::Text => Self::Text,
            FormatArg::Json => Self::Json,
        }
    }
}

impl From<ColorArg> for ColorChoice {
    fn from(value: ColorArg) -> Self {
        match value {
            ColorArg::Auto => Self::Auto,
            ColorArg::Always => Self::Always,
            ColorArg::Never => Self::Never,
        }
    }
}

struct GraphRequest<'a> {
    kind: KindArg,
    targets: &'a [String],
    excludes: &'a [String],
    imports: &'a [String],
    no_reduce: bool,
}

/// Run the CLI using process arguments.
///
/// # Errors
///
/// Returns an error when argument parsing fails (excluding help/version),
/// an input file cannot be read, or rendering fails.
pub fn run() -> Result<i32, CliError> {
    run_from(std::env::args_os())
}

fn run_from<I, T>(args: I) -> Result<i32, CliError>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let cli = match Cli::try_parse_from(args) {
        Ok(parsed) => parsed,
        Err(error) => match error.kind() {
            ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => {
                print!("{error}");
                return Ok(0);
            }
            _ => return Err(error.into()),
        },
    };

    match cli.command {
        Commands::Graph {
            config,
            state,
            schemas,
            kind,
            targets,
            excludes,
            imports,
            no_reduce,
            render,
            format,
        } => {
            let request = GraphRequest {
                kind,
                targets: &targets,
                excludes: &excludes,
                imports: &imports,
                no_reduce,
            };
            let render_options = render.render_options(&config);
            let config: Config = read_json(&config)?;
            let state: State = read_optional_json(state.as_deref())?;
            let schemas: Option<Schemas> = schemas.as_deref().map(read_json).transpose()?;
            run_graph(&config, &state, schemas.as_ref(), &request, format.into(), &render_options)
        }
        Commands::Show {
            plan,
            render,
            format,
        } => {
            let render_options = render.render_options(&plan);
            let plan: Plan = read_json(&plan)?;
            let output_format: OutputFormat = format.into();
            let rendered = render_changes(&plan.changes, output_format, &render_options)?;
            emit_output(&rendered, output_format);
            Ok(0)
        }
        Commands::Validate {
            config,
            schemas,
            render,
            format,
        } => {
            let render_options = render.render_options(&config);
            let config: Config = read_json(&config)?;
            let schemas: Schemas = read_json(&schemas)?;
            let context = Context::new(config, schema_registry(&schemas))?;
            let summary = context.validate()?;
            let output_format: OutputFormat = format.into();
            let rendered = render_walk(&summary, output_format, &render_options)?;
            emit_output(&rendered, output_format);
            Ok(i32::from(summary.diagnostics.has_errors()))
        }
    }
}

fn run_graph(
    config: &Config,
    state: &State,
    schemas: Option<&Schemas>,
    request: &GraphRequest<'_>,
    format: OutputFormat,
    render_options: &RenderOptions,
) -> Result<i32, CliError> {
    let targets = parse_targets(request.targets)?;
    let excludes = parse_targets(request.excludes)?;
    let empty = Schemas::default();
    let known = schemas.unwrap_or(&empty);

    let builder = match request.kind {
        KindArg::Validate => GraphBuilder::validate(config, schemas),
        KindArg::Plan => GraphBuilder::plan(config, state, known),
        KindArg::Apply => GraphBuilder::apply(config, state, known),
        KindArg::Import => GraphBuilder::import(config, known, parse_imports(config, request.imports)?),
    };
    let builder = builder
        .with_targets(targets)
        .with_excludes(excludes)
        .with_options(BuildOptions {
            disable_reduce: request.no_reduce,
        });
    tracing::debug!(kind = %builder.kind(), "building graph");

    let graph = match builder.build(&ModuleInstance::root()) {
        Ok(graph) => graph,
        Err(error) => {
            eprint!("{}", render_diagnostics(&error.diagnostics(), render_options));
            return Ok(1);
        }
    };
    if !graph.warnings().is_empty() {
        eprint!("{}", render_diagnostics(graph.warnings(), render_options));
    }

    let rendered = render_graph(&graph.listing(), format, render_options)?;
    emit_output(&rendered, format);
    Ok(0)
}

fn parse_targets(raw: &[String]) -> Result<Vec<Target>, CliError> {
    raw.iter()
        .map(|target| target.parse::<Target>().map_err(CliError::from))
        .collect()
}

fn parse_imports(config: &Config, raw: &[String]) -> Result<Vec<ImportTarget>, CliError> {
    raw.iter()
        .map(|entry| {
            let (addr, id) = entry
                .split_once('=')
                .ok_or_else(|| CliError::ImportSyntax { raw: entry.clone() })?;
            Ok(ImportTarget::parse(config, addr.trim(), id.trim())?)
        })
        .collect()
}

fn emit_output(rendered: &str, format: OutputFormat) {
    if format == OutputFormat::Text && should_use_pager() && page_output(rendered).is_ok() {
        return;
    }

    if rendered.ends_with('\n') {
        print!("{rendered}");
    } else {
        println!("{rendered}");
    }
}

fn should_use_pager() -> bool {
    std::io::stdout().is_terminal() && std::env::var_os("NO_PAGER").is_none()
}

fn page_output(rendered: &str) -> Result<(), minus::MinusError> {
    let pager = Pager::new();
    pager.set_exit_strategy(ExitStrategy::PagerQuit)?;
    pager.set_text(rendered)?;
    page_all(pager)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used)]

    use std::fs;

    use super::{CliError, parse_imports, parse_targets, run_from};
    use terrace_domain::{Config, ModuleConfig, Resource, ResourceConfig};

    fn config_with_web() -> Config {
        let mut module = ModuleConfig::default();
        module
            .resources
            .push(ResourceConfig::new(Resource::managed("aws_instance", "web")));
        Config::new(module)
    }

    #[test]
    fn help_exits_successfully() {
        let code = run_from(["terrace", "--help"]).expect("help");
        assert_eq!(code, 0);
    }

    #[test]
    fn unknown_flags_are_argument_errors() {
        let error = run_from(["terrace", "graph", "main.json", "--bogus"]).expect_err("must fail");
        assert!(matches!(error, CliError::ArgumentParse(_)));
    }

    #[test]
    fn missing_config_files_are_read_errors() {
        let directory = tempfile::tempdir().expect("tempdir");
        let missing = directory.path().join("missing.json");
        let error = run_from([
            "terrace".into(),
            "graph".into(),
            missing.into_os_string(),
        ])
        .expect_err("must fail");
        assert!(matches!(error, CliError::Read { .. }));
    }

    #[test]
    fn malformed_config_files_are_parse_errors() {
        let directory = tempfile::tempdir().expect("tempdir");
        let path = directory.path().join("main.json");
        fs::write(&path, "{ not json").expect("write config");
        let error = run_from(["terrace".into(), "graph".into(), path.into_os_string()])
            .expect_err("must fail");
        assert!(matches!(error, CliError::Parse { .. }));
    }

    #[test]
    fn targets_are_parsed_as_addresses() {
        let targets = parse_targets(&["module.child.aws_instance.web".to_string()])
            .expect("targets");
        assert_eq!(targets.len(), 1);
        assert!(parse_targets(&["module.".to_string()]).is_err());
    }

    #[test]
    fn imports_need_an_address_and_an_id() {
        let config = config_with_web();
        let imports =
            parse_imports(&config, &["aws_instance.web=i-123".to_string()]).expect("imports");
        assert_eq!(imports[0].id, "i-123");

        let error = parse_imports(&config, &["aws_instance.web".to_string()])
            .expect_err("missing id");
        assert!(matches!(error, CliError::ImportSyntax { .. }));

        let error = parse_imports(&config, &["aws_instance.db=i-1".to_string()])
            .expect_err("undeclared resource");
        assert!(matches!(error, CliError::Import(_)));
    }

    #[test]
    fn show_reads_saved_plans() {
        let directory = tempfile::tempdir().expect("tempdir");
        let path = directory.path().join("plan.json");
        fs::write(&path, r#"{"changes":{"resources":{}}}"#).expect("write plan");
        let code = run_from([
            "terrace".into(),
            "show".into(),
            path.into_os_string(),
            "--format".into(),
            "json".into(),
        ])
        .expect("show");
        assert_eq!(code, 0);
    }
}
