//! # CLI Command Implementations
//!
//! This module contains the actual implementations of CLI commands.
//!
//! Non-server commands build a demo-bootstrapped in-memory engine: the
//! registry has no persistence, so each invocation starts from the demo
//! state. The server command holds the same state for its whole lifetime.

use crate::AppError;
use crate::api::{self, CoreState, EntityJson, json_to_value, value_to_json};
use crate::config::ServerConfig;
use lineal_core::{EcsId, LineageId, Value};
use std::collections::BTreeMap;
use std::path::Path;

// =============================================================================
// SERVER COMMAND
// =============================================================================

/// Start the HTTP server.
pub async fn cmd_server(
    config_path: Option<&Path>,
    host: Option<&str>,
    port: Option<u16>,
) -> Result<(), AppError> {
    let mut config = ServerConfig::load(config_path)?;

    // CLI flags override both config file and environment.
    if host.is_some() || port.is_some() {
        let (current_host, current_port) = config
            .bind
            .rsplit_once(':')
            .map(|(h, p)| (h.to_string(), p.to_string()))
            .unwrap_or_else(|| ("127.0.0.1".to_string(), "8080".to_string()));
        let host = host.map_or(current_host, str::to_string);
        let port = port.map_or(current_port, |p| p.to_string());
        config.bind = format!("{host}:{port}");
    }

    let core = CoreState::demo()?;

    println!("Lineal Entity Graph Server Starting...");
    println!();
    println!("Configuration:");
    println!("  Bind:       {}", config.bind);
    println!("  Rate limit: {}/s", config.rate_limit);
    println!(
        "  Auth:       {}",
        if config.api_key.is_some() {
            "enabled"
        } else {
            "disabled"
        }
    );
    println!();
    println!("Endpoints:");
    println!("  GET  /health                       - Health check");
    println!("  GET  /status                       - Registry counts");
    println!("  GET  /functions                    - List functions");
    println!("  GET  /functions/{{name}}             - Function shapes");
    println!("  GET  /lineages                     - List lineages");
    println!("  GET  /lineages/{{id}}/history        - Version history");
    println!("  GET  /entities/{{root_id}}/{{ecs_id}}  - Entity checkout");
    println!("  GET  /resolve?address=@id.field    - Address resolution");
    println!("  POST /entities                     - Register a root entity");
    println!("  POST /execute                      - Execute a function");
    println!();
    println!("Press Ctrl+C to stop");
    println!();

    api::run_server(&config, core).await
}

// =============================================================================
// STATUS COMMAND
// =============================================================================

/// Show registry status.
pub fn cmd_status(json_mode: bool) -> Result<(), AppError> {
    let core = CoreState::demo()?;

    if json_mode {
        let output = serde_json::json!({
            "entity_count": core.registry.entity_count(),
            "tree_count": core.registry.tree_count(),
            "lineage_count": core.registry.lineage_count(),
            "function_count": core.callables.len(),
        });
        println!(
            "{}",
            serde_json::to_string_pretty(&output).unwrap_or_default()
        );
        return Ok(());
    }

    println!("Lineal Registry Status");
    println!("======================");
    println!();
    println!("Entities:  {}", core.registry.entity_count());
    println!("Trees:     {}", core.registry.tree_count());
    println!("Lineages:  {}", core.registry.lineage_count());
    println!("Functions: {}", core.callables.len());

    Ok(())
}

// =============================================================================
// FUNCTIONS COMMAND
// =============================================================================

/// List registered functions, or show one function's shapes.
pub fn cmd_functions(json_mode: bool, name: Option<&str>) -> Result<(), AppError> {
    let core = CoreState::demo()?;

    if let Some(name) = name {
        let Some(spec) = core.callables.spec(name) else {
            return Err(AppError::InvalidArgument(format!(
                "unknown function '{name}'"
            )));
        };
        if json_mode {
            let output = serde_json::json!({ "name": name, "spec": spec });
            println!(
                "{}",
                serde_json::to_string_pretty(&output).unwrap_or_default()
            );
        } else {
            println!("Function: {name}");
            println!("  Input:  {:?}", spec.input_shape);
            println!("  Output: {:?}", spec.output_shape);
        }
        return Ok(());
    }

    let names = core.callables.names();
    if json_mode {
        let output = serde_json::json!({ "functions": names });
        println!(
            "{}",
            serde_json::to_string_pretty(&output).unwrap_or_default()
        );
        return Ok(());
    }

    println!("Registered Functions");
    println!("====================");
    for name in names {
        println!("  {name}");
    }
    Ok(())
}

// =============================================================================
// LINEAGES COMMAND
// =============================================================================

/// List lineages with their latest root ids.
pub fn cmd_lineages(json_mode: bool) -> Result<(), AppError> {
    let core = CoreState::demo()?;
    let lineages = core.registry.lineages();

    if json_mode {
        let output: Vec<serde_json::Value> = lineages
            .iter()
            .map(|(lineage, root)| {
                serde_json::json!({ "lineage_id": lineage.0, "latest_root": root.0 })
            })
            .collect();
        println!(
            "{}",
            serde_json::to_string_pretty(&output).unwrap_or_default()
        );
        return Ok(());
    }

    println!("Lineages");
    println!("========");
    for (lineage, root) in lineages {
        println!("  lineage {} -> latest root {}", lineage.0, root.0);
    }
    Ok(())
}

// =============================================================================
// HISTORY COMMAND
// =============================================================================

/// Show the full version history of a lineage.
pub fn cmd_history(json_mode: bool, lineage: u64) -> Result<(), AppError> {
    let core = CoreState::demo()?;
    let Some(history) = core.registry.lineage_history(LineageId(lineage)) else {
        return Err(AppError::InvalidArgument(format!(
            "unknown lineage {lineage}"
        )));
    };

    if json_mode {
        let versions: Vec<u64> = history.iter().map(|id| id.0).collect();
        let output = serde_json::json!({ "lineage_id": lineage, "versions": versions });
        println!(
            "{}",
            serde_json::to_string_pretty(&output).unwrap_or_default()
        );
        return Ok(());
    }

    println!("Lineage {lineage} History");
    println!("========================");
    for (index, version) in history.iter().enumerate() {
        println!("  v{index}: {version}");
    }
    Ok(())
}

// =============================================================================
// SHOW COMMAND
// =============================================================================

/// Show one entity checkout.
pub fn cmd_show(json_mode: bool, root: u64, entity: Option<u64>) -> Result<(), AppError> {
    let core = CoreState::demo()?;
    let ecs_id = entity.unwrap_or(root);
    let Some(found) = core
        .registry
        .get_stored_entity(EcsId(root), EcsId(ecs_id))
    else {
        return Err(AppError::InvalidArgument(format!(
            "entity {ecs_id} not found under root {root}"
        )));
    };

    let rendered = EntityJson::from_entity(&found);
    if json_mode {
        println!(
            "{}",
            serde_json::to_string_pretty(&rendered).unwrap_or_default()
        );
        return Ok(());
    }

    println!("Entity @{}", rendered.ecs_id);
    println!("  Kind:    {}", rendered.kind);
    println!("  Lineage: {}", rendered.lineage_id);
    if let Some(previous) = rendered.previous_ecs_id {
        println!("  Previous: {previous}");
    }
    println!("  Fields:");
    for (name, value) in &rendered.fields {
        println!("    {name}: {value}");
    }
    Ok(())
}

// =============================================================================
// CALL COMMAND
// =============================================================================

/// Execute a registered function against the demo engine.
pub fn cmd_call(json_mode: bool, function: &str, args_json: &str) -> Result<(), AppError> {
    let parsed: serde_json::Value = serde_json::from_str(args_json)
        .map_err(|e| AppError::InvalidArgument(format!("args must be a JSON object: {e}")))?;
    let serde_json::Value::Object(arg_map) = parsed else {
        return Err(AppError::InvalidArgument(
            "args must be a JSON object".to_string(),
        ));
    };

    let mut core = CoreState::demo()?;
    let args: BTreeMap<String, Value> = arg_map
        .iter()
        .map(|(name, value)| (name.clone(), json_to_value(value)))
        .collect();

    let CoreState {
        registry,
        callables,
    } = &mut core;
    let outcome = callables.execute(registry, function, args)?;

    if json_mode {
        let output = serde_json::json!({
            "semantic": outcome.semantic.as_str(),
            "pattern": format!("{:?}", outcome.pattern),
            "input_ecs_id": outcome.input_ecs_id.0,
            "audit_ecs_id": outcome.audit_ecs_id.0,
            "outputs": outcome
                .outputs
                .iter()
                .map(EntityJson::from_entity)
                .collect::<Vec<_>>(),
        });
        println!(
            "{}",
            serde_json::to_string_pretty(&output).unwrap_or_default()
        );
        return Ok(());
    }

    println!("Executed '{function}'");
    println!("  Semantic: {}", outcome.semantic.as_str());
    println!("  Pattern:  {:?}", outcome.pattern);
    println!("  Outputs:");
    for output in &outcome.outputs {
        println!(
            "    @{} ({}) {}",
            output.ecs_id,
            output.kind.as_str(),
            value_to_json(&Value::entity(output.clone()))
        );
    }
    Ok(())
}
