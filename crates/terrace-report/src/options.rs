#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ColorChoice {
    #[default]
    Auto,
    Always,
    Never,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RenderOptions {
    pub color: ColorChoice,
    /// Show vertex kinds, unchanged instances, finished vertices and
    /// diagnostic details.
    pub verbose: bool,
    /// Shown next to the command in headers, usually the configuration path.
    pub target: Option<String>,
}
