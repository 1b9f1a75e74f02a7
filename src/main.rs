use std::io::BufRead;
use std::sync::Arc;

use clap::Parser;
use serde::Deserialize;
use tracing::{error, info};

use mcplucene::application::application::Application;
use mcplucene::application::config::configuration::Configuration;
use mcplucene::tools::Tools;

/// One tool invocation as the enclosing transport hands it over: the
/// tool name plus its structured arguments.
#[derive(Deserialize)]
struct ToolCall {
    tool: String,
    #[serde(default = "empty_args")]
    args: serde_json::Value,
}

fn empty_args() -> serde_json::Value {
    serde_json::json!({})
}

fn main() -> anyhow::Result<()> {
    let config = Configuration::parse();
    Application::install_logging(&config);

    let app = Application::initialize(config)?;
    let tools = Tools::new(app.clone());

    if app.config.crawl_on_start || app.service.schema_upgrade_required() {
        let full = app.service.schema_upgrade_required();
        info!(full_reindex = full, "starting initial crawl");
        if let Err(err) = app.crawler.start(full) {
            error!(error = %err, "initial crawl failed to start");
        }
    }

    serve_stdin(&app, &tools);

    app.shutdown();
    Ok(())
}

/// Line-delimited JSON tool calls on stdin, envelopes on stdout. This is
/// the boundary the external JSON-RPC collaborator drives; EOF means the
/// transport is gone and we shut down.
fn serve_stdin(app: &Arc<Application>, tools: &Tools) {
    let stdin = std::io::stdin();
    for line in stdin.lock().lines() {
        let line = match line {
            Ok(line) => line,
            Err(err) => {
                error!(error = %err, "stdin read failed");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }
        let response = match serde_json::from_str::<ToolCall>(&line) {
            Ok(call) => tools.dispatch(&call.tool, call.args),
            Err(err) => serde_json::json!({
                "success": false,
                "error": format!("bad tool call: {err}"),
            }),
        };
        println!("{response}");
    }
    info!(
        documents = app.service.doc_count(),
        "transport closed, shutting down"
    );
}
