use canopy::{
    ConfigOverride, Forest, NodeType, NodeTypeBuilder, Value, config::sequential_keys,
};

/// A forest whose generated keys are predictable: `0-t`, `1-t`, ...
pub fn test_forest() -> Forest {
    let forest = Forest::new();
    let keys = sequential_keys("t");
    forest.configure(ConfigOverride::default().key_generator(move || keys()));
    forest
}

/// Registers a keyed `todo` type with a `title`, a `done` flag and a
/// `toggle` action.
pub fn register_todo(forest: &Forest) -> NodeType {
    forest
        .register_type(
            NodeTypeBuilder::new("todo")
                .with_key("id")
                .default_value("title", || Value::from(""))
                .default_value("done", || Value::Bool(false))
                .action("toggle", |node, _| {
                    let done = node.get("done").and_then(|v| v.as_bool()).unwrap_or(false);
                    node.set("done", !done)?;
                    Ok(Value::Bool(!done))
                })
                .setters_for(["title"]),
        )
        .expect("Failed to register todo type")
}
