use serde_json::{Map, Value};
use terrace_domain::{
    Body, Diagnostic, Diagnostics, EachMode, Expression, InstanceKey, ModuleInstance,
    ResourceConfig,
};

/// Turns configuration expressions into values during a walk.
pub trait Evaluator: Send + Sync {
    /// # Errors
    ///
    /// Returns diagnostics when the expression cannot be evaluated.
    fn evaluate_expr(&self, module: &ModuleInstance, expr: &Expression)
    -> Result<Value, Diagnostics>;

    /// Evaluate a whole block body into an object value.
    ///
    /// # Errors
    ///
    /// Returns diagnostics when an attribute cannot be evaluated.
    fn evaluate_body(&self, module: &ModuleInstance, body: &Body) -> Result<Value, Diagnostics>;

    /// The instance keys a resource expands to.
    ///
    /// # Errors
    ///
    /// Returns diagnostics when `count` or `for_each` is not usable.
    fn expand(
        &self,
        module: &ModuleInstance,
        config: &ResourceConfig,
    ) -> Result<Vec<InstanceKey>, Diagnostics>;
}

/// Evaluates only what the configuration already carries as literal values.
/// Anything that needs a reference resolved comes out as `null`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LiteralEvaluator;

impl LiteralEvaluator {
    fn body_object(body: &Body) -> Map<String, Value> {
        let mut object: Map<String, Value> = body
            .attributes
            .iter()
            .map(|(name, expr)| (name.clone(), expr.value.clone().unwrap_or(Value::Null)))
            .collect();
        for block in &body.blocks {
            if block.dynamic_target().is_some() {
                continue;
            }
            let nested = Value::Object(Self::body_object(&block.body));
            match object
                .entry(block.type_name.clone())
                .or_insert_with(|| Value::Array(Vec::new()))
            {
                Value::Array(items) => items.push(nested),
                other => *other = Value::Array(vec![nested]),
            }
        }
        object
    }
}

/// Largest literal `count` a resource may expand to.
const MAX_COUNT: i64 = 10_000;

fn count_keys(value: &Value) -> Option<Vec<InstanceKey>> {
    let count = value.as_i64().filter(|count| *count >= 0)?;
    Some((0..count).map(InstanceKey::Int).collect())
}

fn for_each_keys(value: &Value) -> Option<Vec<InstanceKey>> {
    match value {
        Value::Object(map) => Some(map.keys().cloned().map(InstanceKey::Str).collect()),
        Value::Array(items) => {
            let mut keys: Vec<InstanceKey> = items
                .iter()
                .map(|item| item.as_str().map(|key| InstanceKey::Str(key.to_string())))
                .collect::<Option<_>>()?;
            keys.sort();
            keys.dedup();
            Some(keys)
        }
        _ => None,
    }
}

impl Evaluator for LiteralEvaluator {
    fn evaluate_expr(
        &self,
        _module: &ModuleInstance,
        expr: &Expression,
    ) -> Result<Value, Diagnostics> {
        Ok(expr.value.clone().unwrap_or(Value::Null))
    }

    fn evaluate_body(&self, _module: &ModuleInstance, body: &Body) -> Result<Value, Diagnostics> {
        Ok(Value::Object(Self::body_object(body)))
    }

    fn expand(
        &self,
        _module: &ModuleInstance,
        config: &ResourceConfig,
    ) -> Result<Vec<InstanceKey>, Diagnostics> {
        let (argument, expr) = match config.each_mode() {
            EachMode::Single => return Ok(vec![InstanceKey::NoKey]),
            EachMode::Count => ("count", config.count.as_ref()),
            EachMode::ForEach => ("for_each", config.for_each.as_ref()),
        };
        let literal = expr.and_then(|expr| expr.value.as_ref());
        if let Some(count) = literal.filter(|_| argument == "count").and_then(Value::as_i64) {
            if count > MAX_COUNT {
                return Err(Diagnostic::error(
                    "Invalid count argument",
                    format!(
                        "The \"count\" value of {} is {count}; at most {MAX_COUNT} instances are supported.",
                        config.resource
                    ),
                )
                .into());
            }
        }
        let keys = literal.and_then(|value| {
            if argument == "count" {
                count_keys(value)
            } else {
                for_each_keys(value)
            }
        });
        keys.ok_or_else(|| {
            Diagnostic::error(
                format!("Invalid {argument} argument"),
                format!(
                    "The \"{argument}\" value of {} must be known before the walk; only literal values are supported.",
                    config.resource
                ),
            )
            .into()
        })
    }
}
