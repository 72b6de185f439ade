//! `gateway plugins` and `gateway connectors`.

use gateway_connectors::ConnectorRegistry;
use gateway_plugins::PluginRegistry;

pub fn plugins() {
    let registry = PluginRegistry::with_builtins();
    print_entries(
        "plugins",
        registry
            .tags()
            .into_iter()
            .map(|tag| (tag, registry.doc(tag).unwrap_or_default())),
    );
}

pub fn connectors() {
    let registry = ConnectorRegistry::with_builtins();
    print_entries(
        "connectors",
        registry
            .tags()
            .into_iter()
            .map(|tag| (tag, registry.doc(tag).unwrap_or_default())),
    );
}

fn print_entries<'a>(kind: &str, entries: impl Iterator<Item = (&'a str, &'a str)>) {
    println!("Registered {kind}:");
    for (tag, doc) in entries {
        println!();
        println!("  {tag}");
        for line in doc.trim().lines() {
            println!("    {line}");
        }
    }
}
