#![allow(clippy::expect_used)]

use std::collections::BTreeMap;

use serde_json::json;
use terrace_domain::{
    AbsProviderConfig, Action, Changes, Diagnostic, Diagnostics, GraphListing, ListedVertex,
    ModuleInstance, ProviderType, ResourceChange, VertexKind, VertexStatus, WalkSummary,
};

use super::{
    ColorChoice, OutputFormat, RenderOptions, render_changes, render_diagnostics, render_graph,
    render_walk,
};

const AWS: &str = r#"provider["registry.terraform.io/hashicorp/aws"]"#;

fn base_options() -> RenderOptions {
    RenderOptions {
        color: ColorChoice::Never,
        verbose: false,
        target: Some("main.tf.json".to_string()),
    }
}

fn verbose_options() -> RenderOptions {
    RenderOptions {
        verbose: true,
        ..base_options()
    }
}

fn vertex(name: &str, kind: VertexKind, dependencies: &[&str]) -> ListedVertex {
    ListedVertex {
        name: name.to_string(),
        kind,
        dependencies: dependencies.iter().map(ToString::to_string).collect(),
    }
}

fn small_listing() -> GraphListing {
    GraphListing {
        path: String::new(),
        vertices: vec![
            vertex("aws_instance.web", VertexKind::Resource, &[AWS]),
            vertex(AWS, VertexKind::Provider, &[]),
            vertex("root", VertexKind::Root, &["aws_instance.web"]),
        ],
    }
}

fn change(addr: &str, action: Action) -> ResourceChange {
    ResourceChange {
        addr: addr.parse().expect("instance address"),
        provider: AbsProviderConfig::new(
            ModuleInstance::root(),
            ProviderType::default_for("aws"),
            None,
        ),
        action,
        before: json!(null),
        after: json!(null),
    }
}

fn changes_of(changes: Vec<ResourceChange>) -> Changes {
    let mut all = Changes::default();
    for change in changes {
        all.insert(change);
    }
    all
}

fn failed_walk() -> WalkSummary {
    let statuses: BTreeMap<String, VertexStatus> = [
        ("local.a", VertexStatus::Done),
        ("local.b", VertexStatus::Failed),
        ("local.c", VertexStatus::Skipped),
    ]
    .into_iter()
    .map(|(name, status)| (name.to_string(), status))
    .collect();
    WalkSummary {
        statuses,
        diagnostics: Diagnostic::error("Provider failed", "boom")
            .at("local.b")
            .into(),
        cancelled: false,
    }
}

#[test]
fn graph_text_lists_vertices_with_their_dependencies() {
    let rendered =
        render_graph(&small_listing(), OutputFormat::Text, &base_options()).expect("render");
    let expected = format!(
        "graph main.tf.json\n\
         \n\
         aws_instance.web\n  {AWS}\n\
         {AWS}\n\
         root\n  aws_instance.web\n\
         \n\
         Graph: 3 vertices, 2 edges (1 resource, 1 provider, 1 root)\n"
    );
    assert_eq!(rendered, expected);
}

#[test]
fn graph_text_shows_kinds_when_verbose() {
    let rendered =
        render_graph(&small_listing(), OutputFormat::Text, &verbose_options()).expect("render");
    assert!(rendered.contains("aws_instance.web (resource)\n"));
    assert!(rendered.contains(&format!("{AWS} (provider)\n")));
}

#[test]
fn graph_text_names_child_module_paths() {
    let listing = GraphListing {
        path: "module.child".to_string(),
        vertices: Vec::new(),
    };
    let rendered = render_graph(&listing, OutputFormat::Text, &base_options()).expect("render");
    assert_eq!(rendered, "graph main.tf.json module.child\n  Empty graph.\n");
}

#[test]
fn graph_json_keeps_kinds_in_snake_case() {
    let mut listing = small_listing();
    listing
        .vertices
        .push(vertex(&format!("{AWS} (close)"), VertexKind::ProviderClose, &[AWS]));
    let rendered = render_graph(&listing, OutputFormat::Json, &base_options()).expect("render");
    let value: serde_json::Value = serde_json::from_str(&rendered).expect("json");
    assert_eq!(value["vertices"][3]["kind"], json!("provider_close"));
    assert_eq!(value["vertices"][3]["dependencies"], json!([AWS]));
}

#[test]
fn colored_output_contains_ansi_sequences() {
    let options = RenderOptions {
        color: ColorChoice::Always,
        ..base_options()
    };
    let rendered = render_graph(&small_listing(), OutputFormat::Text, &options).expect("render");
    assert!(rendered.contains('\u{1b}'));
    assert_eq!(
        console::strip_ansi_codes(&rendered),
        render_graph(&small_listing(), OutputFormat::Text, &base_options()).expect("render")
    );
}

#[test]
fn changes_text_lists_actions_and_tally() {
    let changes = changes_of(vec![
        change("aws_instance.web", Action::Create),
        change("aws_instance.db", Action::Replace),
        change("aws_instance.old", Action::Delete),
        change("aws_instance.same", Action::NoOp),
    ]);
    let rendered = render_changes(&changes, OutputFormat::Text, &base_options()).expect("render");
    assert_eq!(
        rendered,
        "plan main.tf.json\n\
         \n\
         \x20 -/+ replace     aws_instance.db\n\
         \x20   - destroy     aws_instance.old\n\
         \x20   + create      aws_instance.web\n\
         \n\
         Plan: 1 to add, 1 to replace, 1 to destroy\n"
    );
}

#[test]
fn changes_text_hides_unchanged_instances_unless_verbose() {
    let changes = changes_of(vec![change("aws_instance.same", Action::NoOp)]);

    let rendered = render_changes(&changes, OutputFormat::Text, &base_options()).expect("render");
    assert_eq!(rendered, "plan main.tf.json\n  No changes.\n  1 unchanged\n");

    let verbose =
        render_changes(&changes, OutputFormat::Text, &verbose_options()).expect("render");
    assert!(verbose.contains("unchanged   aws_instance.same"));
    assert!(verbose.ends_with("Plan: nothing to do\n"));
}

#[test]
fn walk_text_reports_failures_and_skips() {
    let rendered = render_walk(&failed_walk(), OutputFormat::Text, &base_options()).expect("render");
    assert_eq!(
        rendered,
        "walk main.tf.json\n\
         \n\
         \x20 failed      local.b\n\
         \x20 skipped     local.c\n\
         \n\
         \x20 error: Provider failed (local.b)\n\
         \n\
         Walk: 1 done, 1 failed, 1 skipped\n"
    );
}

#[test]
fn walk_text_marks_cancelled_walks() {
    let summary = WalkSummary {
        cancelled: true,
        ..WalkSummary::default()
    };
    let options = RenderOptions {
        target: None,
        ..base_options()
    };
    let rendered = render_walk(&summary, OutputFormat::Text, &options).expect("render");
    assert_eq!(rendered, "walk (cancelled)\n\nWalk: nothing visited\n");
}

#[test]
fn walk_json_serializes_statuses() {
    let rendered = render_walk(&failed_walk(), OutputFormat::Json, &base_options()).expect("render");
    let value: serde_json::Value = serde_json::from_str(&rendered).expect("json");
    assert_eq!(value["statuses"]["local.c"], json!("skipped"));
    assert_eq!(value["diagnostics"][0]["address"], json!("local.b"));
}

#[test]
fn diagnostics_show_details_only_when_verbose() {
    let mut diagnostics = Diagnostics::new();
    diagnostics.push(Diagnostic::warning("Target matched nothing", "aws_instance.nope"));
    diagnostics.push(
        Diagnostic::error("Cycle: a, b", "line one\nline two").at("a"),
    );

    assert_eq!(
        render_diagnostics(&diagnostics, &base_options()),
        "\n  warn: Target matched nothing\n  error: Cycle: a, b (a)\n"
    );
    assert_eq!(
        render_diagnostics(&diagnostics, &verbose_options()),
        "\n  warn: Target matched nothing\n    aws_instance.nope\n  error: Cycle: a, b (a)\n    line one\n    line two\n"
    );
}
