use std::collections::BTreeSet;

use terrace_domain::{
    AttributeType, Block, BlockSchema, Body, Diagnostic, Diagnostics, Expression, Reference,
    parse_reference,
};

/// Collect everything a configuration body refers to.
///
/// With a schema, only attributes and nested blocks the schema knows are
/// followed; attributes typed as a collection of objects may also be written
/// as repeated blocks and are scanned as such. Without a schema every
/// attribute and block is scanned.
///
/// `dynamic` blocks contribute their `for_each` expression and their
/// `content` body. The iterator name (the block label unless `iterator`
/// overrides it) is bound locally and never becomes a reference.
///
/// # Errors
///
/// Returns one diagnostic per traversal that cannot be parsed.
pub fn references_in_block(
    body: &Body,
    schema: Option<&BlockSchema>,
) -> Result<BTreeSet<Reference>, Diagnostics> {
    let mut analyzer = Analyzer::default();
    analyzer.body(body, schema, &[]);
    analyzer.finish()
}

/// # Errors
///
/// Returns one diagnostic per traversal that cannot be parsed.
pub fn references_in_expr(expr: &Expression) -> Result<BTreeSet<Reference>, Diagnostics> {
    let mut analyzer = Analyzer::default();
    analyzer.expr(expr, &[]);
    analyzer.finish()
}

/// References named by `depends_on` lists.
///
/// # Errors
///
/// Returns one diagnostic per entry that is not a valid reference.
pub fn references_in_traversals(
    traversals: &[String],
) -> Result<BTreeSet<Reference>, Diagnostics> {
    let mut analyzer = Analyzer::default();
    for traversal in traversals {
        analyzer.traversal(traversal, &[]);
    }
    analyzer.finish()
}

enum NestedSchema<'a> {
    Block(&'a BlockSchema),
    AttributeAsBlocks,
}

fn nested_schema<'a>(schema: &'a BlockSchema, type_name: &str) -> Option<NestedSchema<'a>> {
    if let Some(nested) = schema.block_types.get(type_name) {
        return Some(NestedSchema::Block(&nested.block));
    }
    schema
        .attributes
        .get(type_name)
        .filter(|attribute| {
            attribute.ty.is_collection_of_objects() || attribute.ty == AttributeType::Dynamic
        })
        .map(|_| NestedSchema::AttributeAsBlocks)
}

#[derive(Default)]
struct Analyzer {
    found: BTreeSet<Reference>,
    diagnostics: Diagnostics,
}

impl Analyzer {
    fn finish(self) -> Result<BTreeSet<Reference>, Diagnostics> {
        if self.diagnostics.has_errors() {
            Err(self.diagnostics)
        } else {
            Ok(self.found)
        }
    }

    fn body(&mut self, body: &Body, schema: Option<&BlockSchema>, iterators: &[String]) {
        for expr in body.attributes.values() {
            self.expr(expr, iterators);
        }
        for block in &body.blocks {
            self.block(block, schema, iterators);
        }
    }

    fn block(&mut self, block: &Block, schema: Option<&BlockSchema>, iterators: &[String]) {
        let type_name = block.dynamic_target().unwrap_or(&block.type_name);
        let nested = match schema {
            None => None,
            Some(schema) => match nested_schema(schema, type_name) {
                Some(NestedSchema::Block(nested)) => Some(nested),
                Some(NestedSchema::AttributeAsBlocks) => None,
                // Not part of this block type; validation reports it.
                None => return,
            },
        };

        if block.dynamic_target().is_none() {
            self.body(&block.body, nested, iterators);
            return;
        }

        let iterator = dynamic_iterator(block);
        for (name, expr) in &block.body.attributes {
            if name != "iterator" {
                self.expr(expr, iterators);
            }
        }

        let mut inner = iterators.to_vec();
        inner.push(iterator);
        for content in block.body.blocks_of_type("content") {
            self.body(&content.body, nested, &inner);
        }
    }

    fn expr(&mut self, expr: &Expression, iterators: &[String]) {
        for traversal in &expr.traversals {
            self.traversal(traversal, iterators);
        }
    }

    fn traversal(&mut self, traversal: &str, iterators: &[String]) {
        let root = traversal
            .split(['.', '['])
            .next()
            .unwrap_or_default()
            .trim();
        if iterators.iter().any(|name| name == root) {
            return;
        }
        match parse_reference(traversal) {
            Ok(Some(reference)) => {
                self.found.insert(reference);
            }
            Ok(None) => {}
            Err(error) => self
                .diagnostics
                .push(Diagnostic::error("Invalid reference", error.to_string())),
        }
    }
}

fn dynamic_iterator(block: &Block) -> String {
    let label = block.labels.first().cloned().unwrap_or_default();
    let Some(expr) = block.body.attributes.get("iterator") else {
        return label;
    };
    expr.value
        .as_ref()
        .and_then(|value| value.as_str().map(str::to_string))
        .or_else(|| expr.traversals.first().cloned())
        .unwrap_or(label)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used)]

    use std::collections::BTreeSet;

    use serde_json::json;
    use terrace_domain::{
        AttributeSchema, AttributeType, Block, BlockSchema, Body, Expression, NestedBlockSchema,
        NestingMode, Reference, Resource,
    };

    use super::{references_in_block, references_in_expr};

    fn resource(type_name: &str, name: &str) -> Reference {
        Reference::Resource(Resource::managed(type_name, name))
    }

    fn schema_with_nested_block() -> BlockSchema {
        BlockSchema::default()
            .with_attribute("ami", AttributeSchema::optional(AttributeType::String))
            .with_block_type(
                "network",
                NestedBlockSchema {
                    nesting: NestingMode::List,
                    block: BlockSchema::default()
                        .with_attribute("subnet", AttributeSchema::optional(AttributeType::String)),
                },
            )
    }

    #[test]
    fn empty_body_has_no_references() {
        let found = references_in_block(&Body::default(), None).expect("analyze");
        assert!(found.is_empty());
    }

    #[test]
    fn scans_nested_blocks_known_to_the_schema() {
        let body = Body::default()
            .with_attribute("ami", Expression::refs(["var.ami"]))
            .with_block(Block::new(
                "network",
                Body::default().with_attribute("subnet", Expression::refs(["aws_subnet.a.id"])),
            ))
            .with_block(Block::new(
                "bogus",
                Body::default().with_attribute("x", Expression::refs(["aws_vpc.ignored.id"])),
            ));

        let found =
            references_in_block(&body, Some(&schema_with_nested_block())).expect("analyze");
        let expected: BTreeSet<_> = [
            Reference::Variable("ami".to_string()),
            resource("aws_subnet", "a"),
        ]
        .into_iter()
        .collect();
        assert_eq!(found, expected);
    }

    #[test]
    fn without_schema_everything_is_scanned() {
        let body = Body::default().with_block(Block::new(
            "bogus",
            Body::default().with_attribute("x", Expression::refs(["aws_vpc.main.id"])),
        ));
        let found = references_in_block(&body, None).expect("analyze");
        assert!(found.contains(&resource("aws_vpc", "main")));
    }

    #[test]
    fn dynamic_blocks_contribute_for_each_and_content() {
        let body = Body::default().with_block(Block::dynamic(
            "network",
            Expression::refs(["var.networks"]),
            Body::default().with_attribute(
                "subnet",
                Expression::refs(["network.value.subnet", "aws_subnet.extra.id"]),
            ),
        ));

        let found =
            references_in_block(&body, Some(&schema_with_nested_block())).expect("analyze");
        let expected: BTreeSet<_> = [
            Reference::Variable("networks".to_string()),
            resource("aws_subnet", "extra"),
        ]
        .into_iter()
        .collect();
        assert_eq!(found, expected);
    }

    #[test]
    fn custom_iterator_name_is_bound_locally() {
        let mut block = Block::dynamic(
            "network",
            Expression::refs(["local.nets"]),
            Body::default().with_attribute("subnet", Expression::refs(["net.value"])),
        );
        block
            .body
            .attributes
            .insert("iterator".to_string(), Expression::literal(json!("net")));

        let body = Body::default().with_block(block);
        let found = references_in_block(&body, None).expect("analyze");
        assert_eq!(
            found,
            [Reference::Local("nets".to_string())].into_iter().collect()
        );
    }

    #[test]
    fn attribute_written_as_blocks_is_scanned() {
        let object = AttributeType::Object(
            [("cidr".to_string(), AttributeType::String)]
                .into_iter()
                .collect(),
        );
        let schema = BlockSchema::default().with_attribute(
            "ingress",
            AttributeSchema::optional(AttributeType::List(Box::new(object))),
        );
        let body = Body::default()
            .with_block(Block::new(
                "ingress",
                Body::default().with_attribute("cidr", Expression::refs(["aws_vpc.main.cidr"])),
            ))
            .with_block(Block::dynamic(
                "ingress",
                Expression::refs(["var.rules"]),
                Body::default().with_attribute("cidr", Expression::refs(["ingress.value"])),
            ));

        let found = references_in_block(&body, Some(&schema)).expect("analyze");
        let expected: BTreeSet<_> = [
            Reference::Variable("rules".to_string()),
            resource("aws_vpc", "main"),
        ]
        .into_iter()
        .collect();
        assert_eq!(found, expected);
    }

    #[test]
    fn non_graph_roots_are_dropped() {
        let expr = Expression::refs(["count.index", "each.key", "path.module", "self.id"]);
        assert!(references_in_expr(&expr).expect("analyze").is_empty());
    }

    #[test]
    fn invalid_traversal_is_a_diagnostic() {
        let expr = Expression::refs(["var"]);
        let diagnostics = references_in_expr(&expr).expect_err("must fail");
        assert!(diagnostics.has_errors());
        assert_eq!(
            diagnostics.iter().next().map(|diagnostic| diagnostic.summary.as_str()),
            Some("Invalid reference")
        );
    }
}
