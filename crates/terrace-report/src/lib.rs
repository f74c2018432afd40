use std::collections::BTreeMap;
use std::fmt::Write;
use std::io::{self, IsTerminal};

use console::Style;
use terrace_domain::{
    Action, Changes, Diagnostic, Diagnostics, GraphListing, ListedVertex, ResourceChange,
    Severity, VertexKind, VertexStatus, WalkSummary,
};

mod error;
mod options;

pub use error::ReportError;
pub use options::{ColorChoice, OutputFormat, RenderOptions};

/// Render a graph listing in the requested output format.
///
/// # Errors
///
/// Returns an error if JSON serialization fails.
pub fn render_graph(
    listing: &GraphListing,
    format: OutputFormat,
    options: &RenderOptions,
) -> Result<String, ReportError> {
    match format {
        OutputFormat::Json => to_json(listing, "graph listing"),
        OutputFormat::Text => Ok(render_graph_text(listing, options)),
    }
}

/// Render planned changes in the requested output format.
///
/// # Errors
///
/// Returns an error if JSON serialization fails.
pub fn render_changes(
    changes: &Changes,
    format: OutputFormat,
    options: &RenderOptions,
) -> Result<String, ReportError> {
    match format {
        OutputFormat::Json => to_json(changes, "planned changes"),
        OutputFormat::Text => Ok(render_changes_text(changes, options)),
    }
}

/// Render the outcome of a graph walk in the requested output format.
///
/// # Errors
///
/// Returns an error if JSON serialization fails.
pub fn render_walk(
    summary: &WalkSummary,
    format: OutputFormat,
    options: &RenderOptions,
) -> Result<String, ReportError> {
    match format {
        OutputFormat::Json => to_json(summary, "walk summary"),
        OutputFormat::Text => Ok(render_walk_text(summary, options)),
    }
}

/// Render diagnostics as text, one block per diagnostic. Details are only
/// shown in verbose mode.
#[must_use]
pub fn render_diagnostics(diagnostics: &Diagnostics, options: &RenderOptions) -> String {
    let mut output = String::new();
    let style = TextStyle::new(options.color);
    append_diagnostics(&mut output, diagnostics, options.verbose, &style);
    output
}

fn to_json<T: serde::Serialize>(value: &T, what: &'static str) -> Result<String, ReportError> {
    serde_json::to_string_pretty(value).map_err(|source| ReportError::JsonSerialize { what, source })
}

// ---------------------------------------------------------------------------
// Graph text
// ---------------------------------------------------------------------------

fn render_graph_text(listing: &GraphListing, options: &RenderOptions) -> String {
    let mut output = String::new();
    let style = TextStyle::new(options.color);

    let module = (!listing.path.is_empty()).then_some(listing.path.as_str());
    append_header(&mut output, "graph", options.target.as_deref(), module, &style);

    if listing.vertices.is_empty() {
        let _ = writeln!(output, "  Empty graph.");
        return output;
    }

    let _ = writeln!(output);
    for vertex in &listing.vertices {
        append_vertex(&mut output, vertex, options.verbose, &style);
    }

    let _ = writeln!(output);
    let tally = KindTally::from_vertices(&listing.vertices);
    let _ = writeln!(output, "{}", tally.format(&style));
    output
}

fn append_vertex(output: &mut String, vertex: &ListedVertex, verbose: bool, style: &TextStyle) {
    let name = style.vertex_name(vertex.kind, &vertex.name);
    if verbose {
        let _ = writeln!(output, "{name} {}", style.dim(&format!("({})", kind_label(vertex.kind))));
    } else {
        let _ = writeln!(output, "{name}");
    }
    for dependency in &vertex.dependencies {
        let _ = writeln!(output, "  {}", style.dim(dependency));
    }
}

const fn kind_label(kind: VertexKind) -> &'static str {
    match kind {
        VertexKind::Resource => "resource",
        VertexKind::Orphan => "orphan",
        VertexKind::Provider => "provider",
        VertexKind::ProviderClose => "provider close",
        VertexKind::CountBoundary => "count boundary",
        VertexKind::Variable => "variable",
        VertexKind::Local => "local",
        VertexKind::Output => "output",
        VertexKind::Root => "root",
    }
}

// ---------------------------------------------------------------------------
// Changes text
// ---------------------------------------------------------------------------

fn render_changes_text(changes: &Changes, options: &RenderOptions) -> String {
    let mut output = String::new();
    let style = TextStyle::new(options.color);

    append_header(&mut output, "plan", options.target.as_deref(), None, &style);

    let (changed, unchanged): (Vec<&ResourceChange>, Vec<&ResourceChange>) =
        changes.iter().partition(|change| change.action.is_change());

    if changed.is_empty() && !options.verbose {
        let _ = writeln!(output, "  No changes.");
        if !unchanged.is_empty() {
            let _ = writeln!(output, "  {}", style.dim(&format!("{} unchanged", unchanged.len())));
        }
        return output;
    }

    let _ = writeln!(output);
    for change in &changed {
        append_change_line(&mut output, change, &style);
    }
    if options.verbose {
        for change in &unchanged {
            append_change_line(&mut output, change, &style);
        }
    }

    let _ = writeln!(output);
    let tally = ActionTally::from_changes(changes);
    let _ = writeln!(output, "{}", tally.format(&style));
    output
}

fn append_change_line(output: &mut String, change: &ResourceChange, style: &TextStyle) {
    let symbol = style.action_symbol(change.action);
    let label = TextStyle::pad_label(&style.action_label(change.action));
    let _ = writeln!(
        output,
        "  {symbol} {label}{}",
        style.primary_text(&change.addr.to_string())
    );
}

const fn action_label(action: Action) -> &'static str {
    match action {
        Action::NoOp => "unchanged",
        Action::Create => "create",
        Action::Read => "read",
        Action::Update => "update",
        Action::Replace => "replace",
        Action::Delete => "destroy",
    }
}

// ---------------------------------------------------------------------------
// Walk text
// ---------------------------------------------------------------------------

fn render_walk_text(summary: &WalkSummary, options: &RenderOptions) -> String {
    let mut output = String::new();
    let style = TextStyle::new(options.color);

    let suffix = summary.cancelled.then_some("(cancelled)");
    append_header(&mut output, "walk", options.target.as_deref(), suffix, &style);

    let shown: Vec<(&String, VertexStatus)> = summary
        .statuses
        .iter()
        .map(|(name, status)| (name, *status))
        .filter(|(_, status)| options.verbose || *status != VertexStatus::Done)
        .collect();
    if !shown.is_empty() {
        let _ = writeln!(output);
        for (name, status) in shown {
            let label = TextStyle::pad_label(&style.status_label(status));
            let _ = writeln!(output, "  {label}{}", style.primary_text(name));
        }
    }

    append_diagnostics(&mut output, &summary.diagnostics, options.verbose, &style);

    let _ = writeln!(output);
    let _ = writeln!(output, "{}", format_status_tally(summary, &style));
    output
}

fn format_status_tally(summary: &WalkSummary, style: &TextStyle) -> String {
    let mut parts = Vec::new();
    for status in [VertexStatus::Done, VertexStatus::Failed, VertexStatus::Skipped] {
        let count = summary.count(status);
        if count > 0 {
            parts.push(style.status_text(status, &format!("{count} {}", status_label(status))));
        }
    }
    if parts.is_empty() {
        format!("{} nothing visited", style.tally_label("Walk:"))
    } else {
        format!("{} {}", style.tally_label("Walk:"), parts.join(", "))
    }
}

const fn status_label(status: VertexStatus) -> &'static str {
    match status {
        VertexStatus::Pending => "pending",
        VertexStatus::Runnable => "runnable",
        VertexStatus::Running => "running",
        VertexStatus::Done => "done",
        VertexStatus::Failed => "failed",
        VertexStatus::Skipped => "skipped",
    }
}

// ---------------------------------------------------------------------------
// Header & diagnostics
// ---------------------------------------------------------------------------

fn append_header(
    output: &mut String,
    command: &str,
    target: Option<&str>,
    suffix: Option<&str>,
    style: &TextStyle,
) {
    let _ = write!(output, "{}", style.header_command(command));
    if let Some(target) = target {
        let _ = write!(output, " {}", style.header_target(target));
    }
    if let Some(suffix) = suffix {
        let _ = write!(output, " {suffix}");
    }
    let _ = writeln!(output);
}

fn append_diagnostics(
    output: &mut String,
    diagnostics: &Diagnostics,
    verbose: bool,
    style: &TextStyle,
) {
    if diagnostics.is_empty() {
        return;
    }
    let _ = writeln!(output);
    for diagnostic in diagnostics {
        append_diagnostic(output, diagnostic, verbose, style);
    }
}

fn append_diagnostic(output: &mut String, diagnostic: &Diagnostic, verbose: bool, style: &TextStyle) {
    let prefix = match diagnostic.severity {
        Severity::Error => style.error_prefix("error:"),
        Severity::Warning => style.warn_prefix("warn:"),
    };
    let _ = write!(output, "  {prefix} {}", diagnostic.summary);
    if let Some(address) = &diagnostic.address {
        let _ = write!(output, " {}", style.dim(&format!("({address})")));
    }
    let _ = writeln!(output);
    if verbose && !diagnostic.detail.is_empty() {
        for line in diagnostic.detail.lines() {
            let _ = writeln!(output, "    {line}");
        }
    }
}

// ---------------------------------------------------------------------------
// Tallies
// ---------------------------------------------------------------------------

struct KindTally {
    vertices: usize,
    edges: usize,
    kinds: BTreeMap<VertexKind, usize>,
}

impl KindTally {
    fn from_vertices(vertices: &[ListedVertex]) -> Self {
        let mut kinds = BTreeMap::new();
        for vertex in vertices {
            *kinds.entry(vertex.kind).or_insert(0) += 1;
        }
        Self {
            vertices: vertices.len(),
            edges: vertices.iter().map(|vertex| vertex.dependencies.len()).sum(),
            kinds,
        }
    }

    fn format(&self, style: &TextStyle) -> String {
        let breakdown: Vec<String> = self
            .kinds
            .iter()
            .map(|(kind, count)| format!("{count} {}", kind_label(*kind)))
            .collect();
        format!(
            "{} {} vertices, {} edges {}",
            style.tally_label("Graph:"),
            self.vertices,
            self.edges,
            style.dim(&format!("({})", breakdown.join(", ")))
        )
    }
}

#[derive(Default)]
struct ActionTally {
    create: usize,
    update: usize,
    replace: usize,
    delete: usize,
    read: usize,
}

impl ActionTally {
    fn from_changes(changes: &Changes) -> Self {
        let mut tally = Self::default();
        for change in changes.iter() {
            match change.action {
                Action::Create => tally.create += 1,
                Action::Update => tally.update += 1,
                Action::Replace => tally.replace += 1,
                Action::Delete => tally.delete += 1,
                Action::Read => tally.read += 1,
                Action::NoOp => {}
            }
        }
        tally
    }

    fn format(&self, style: &TextStyle) -> String {
        let mut parts = Vec::new();
        if self.create > 0 {
            parts.push(style.add_label(&format!("{} to add", self.create)));
        }
        if self.update > 0 {
            parts.push(style.change_label(&format!("{} to change", self.update)));
        }
        if self.replace > 0 {
            parts.push(style.replace_label(&format!("{} to replace", self.replace)));
        }
        if self.delete > 0 {
            parts.push(style.destroy_label(&format!("{} to destroy", self.delete)));
        }
        if self.read > 0 {
            parts.push(style.dim(&format!("{} to read", self.read)));
        }
        if parts.is_empty() {
            format!("{} nothing to do", style.tally_label("Plan:"))
        } else {
            format!("{} {}", style.tally_label("Plan:"), parts.join(", "))
        }
    }
}

// ---------------------------------------------------------------------------
// TextStyle
// ---------------------------------------------------------------------------

const LABEL_WIDTH: usize = 12;

#[derive(Debug, Clone)]
struct TextStyle {
    color_enabled: bool,
    // Actions
    add_style: Style,
    change_style: Style,
    replace_style: Style,
    destroy_style: Style,
    // Vertices
    resource_style: Style,
    structural_style: Style,
    // Content
    primary_style: Style,
    dim_style: Style,
    // Header
    header_cmd_style: Style,
    header_target_style: Style,
    // Prefixes
    warn_prefix_style: Style,
    error_prefix_style: Style,
    // Tally
    tally_label_style: Style,
}

impl TextStyle {
    fn new(choice: ColorChoice) -> Self {
        Self {
            color_enabled: should_color(choice),
            add_style: Style::new().green(),
            change_style: Style::new().cyan(),
            replace_style: Style::new().yellow(),
            destroy_style: Style::new().red(),
            resource_style: Style::new().white().bold(),
            structural_style: Style::new().magenta(),
            primary_style: Style::new().white(),
            dim_style: Style::new().dim(),
            header_cmd_style: Style::new().white().bold(),
            header_target_style: Style::new().dim(),
            warn_prefix_style: Style::new().yellow().bold(),
            error_prefix_style: Style::new().red().bold(),
            tally_label_style: Style::new().white().bold(),
        }
    }

    fn paint<T: std::fmt::Display>(&self, style: &Style, text: T) -> String {
        if self.color_enabled {
            style.clone().force_styling(true).apply_to(text).to_string()
        } else {
            text.to_string()
        }
    }

    fn pad_label(painted: &str) -> String {
        let visible_len = console::measure_text_width(painted);
        if visible_len < LABEL_WIDTH {
            format!("{painted}{}", " ".repeat(LABEL_WIDTH - visible_len))
        } else {
            format!("{painted} ")
        }
    }

    fn action_style(&self, action: Action) -> &Style {
        match action {
            Action::Create => &self.add_style,
            Action::Update => &self.change_style,
            Action::Replace => &self.replace_style,
            Action::Delete => &self.destroy_style,
            Action::NoOp | Action::Read => &self.dim_style,
        }
    }

    fn action_symbol(&self, action: Action) -> String {
        let symbol = format!("{:>3}", action.symbol());
        self.paint(&self.action_style(action).clone().bold(), symbol)
    }

    fn action_label(&self, action: Action) -> String {
        self.paint(self.action_style(action), action_label(action))
    }

    fn vertex_name(&self, kind: VertexKind, name: &str) -> String {
        match kind {
            VertexKind::Resource => self.paint(&self.resource_style, name),
            VertexKind::Orphan => self.paint(&self.destroy_style, name),
            VertexKind::Provider
            | VertexKind::ProviderClose
            | VertexKind::CountBoundary
            | VertexKind::Root => self.paint(&self.structural_style, name),
            VertexKind::Variable | VertexKind::Local | VertexKind::Output => {
                self.paint(&self.primary_style, name)
            }
        }
    }

    fn status_text(&self, status: VertexStatus, text: &str) -> String {
        match status {
            VertexStatus::Done => self.paint(&self.add_style, text),
            VertexStatus::Failed => self.paint(&self.destroy_style, text),
            VertexStatus::Skipped => self.paint(&self.replace_style, text),
            VertexStatus::Pending | VertexStatus::Runnable | VertexStatus::Running => {
                self.paint(&self.dim_style, text)
            }
        }
    }

    fn status_label(&self, status: VertexStatus) -> String {
        self.status_text(status, status_label(status))
    }

    fn add_label(&self, s: &str) -> String {
        self.paint(&self.add_style, s)
    }
    fn change_label(&self, s: &str) -> String {
        self.paint(&self.change_style, s)
    }
    fn replace_label(&self, s: &str) -> String {
        self.paint(&self.replace_style, s)
    }
    fn destroy_label(&self, s: &str) -> String {
        self.paint(&self.destroy_style, s)
    }

    fn primary_text(&self, s: &str) -> String {
        self.paint(&self.primary_style, s)
    }
    fn dim(&self, s: &str) -> String {
        self.paint(&self.dim_style, s)
    }

    fn header_command(&self, s: &str) -> String {
        self.paint(&self.header_cmd_style, s)
    }
    fn header_target(&self, s: &str) -> String {
        self.paint(&self.header_target_style, s)
    }

    fn warn_prefix(&self, s: &str) -> String {
        self.paint(&self.warn_prefix_style, s)
    }
    fn error_prefix(&self, s: &str) -> String {
        self.paint(&self.error_prefix_style, s)
    }

    fn tally_label(&self, s: &str) -> String {
        self.paint(&self.tally_label_style, s)
    }
}

fn should_color(choice: ColorChoice) -> bool {
    match choice {
        ColorChoice::Always => true,
        ColorChoice::Never => false,
        ColorChoice::Auto => io::stdout().is_terminal(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests;
