use terrace_domain::{BlockSchema, Body, Diagnostic, Diagnostics, NestingMode};

/// Check a configuration body against its schema: unknown arguments and
/// block types, values for computed-only attributes, missing required
/// arguments and single blocks given more than once.
#[must_use]
pub fn validate_body(body: &Body, schema: &BlockSchema) -> Diagnostics {
    let mut diagnostics = Diagnostics::new();

    for name in body.attributes.keys() {
        match schema.attributes.get(name) {
            None => diagnostics.push(Diagnostic::error(
                "Unsupported argument",
                format!("An argument named \"{name}\" is not expected here."),
            )),
            Some(attribute) if attribute.computed && !attribute.optional => {
                diagnostics.push(Diagnostic::error(
                    "Value for unconfigurable attribute",
                    format!(
                        "Can't configure a value for \"{name}\": its value will be decided automatically based on the result of applying this configuration."
                    ),
                ));
            }
            Some(_) => {}
        }
    }

    for (name, attribute) in &schema.attributes {
        let written_as_blocks = body.blocks_of_type(name).next().is_some();
        if attribute.required && !body.attributes.contains_key(name) && !written_as_blocks {
            diagnostics.push(Diagnostic::error(
                "Missing required argument",
                format!("The argument \"{name}\" is required, but no definition was found."),
            ));
        }
    }

    for block in &body.blocks {
        let type_name = block.dynamic_target().unwrap_or(&block.type_name);
        if let Some(nested) = schema.block_types.get(type_name) {
            if block.dynamic_target().is_some() {
                for content in block.body.blocks_of_type("content") {
                    diagnostics.extend(validate_body(&content.body, &nested.block));
                }
            } else {
                diagnostics.extend(validate_body(&block.body, &nested.block));
            }
            continue;
        }
        let attribute_as_blocks = schema
            .attributes
            .get(type_name)
            .is_some_and(|attribute| attribute.ty.is_collection_of_objects());
        if !attribute_as_blocks {
            diagnostics.push(Diagnostic::error(
                "Unsupported block type",
                format!("Blocks of type \"{type_name}\" are not expected here."),
            ));
        }
    }

    for (name, nested) in &schema.block_types {
        if nested.nesting != NestingMode::Single {
            continue;
        }
        if body.blocks_of_type(name).count() > 1 {
            diagnostics.push(Diagnostic::error(
                "Too many blocks",
                format!("No more than one \"{name}\" block is allowed."),
            ));
        }
    }

    diagnostics
}
