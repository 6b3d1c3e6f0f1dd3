use crate::config::Settings;
use crate::services::{current_datetime_info, BackendClient, McpClient, McpToolManager, ModelManager};
use std::sync::Arc;

pub async fn run() {
    println!("🔍 Checking configuration...\n");

    let settings = Settings::from_env();
    let mut issues = 0;

    // MCP server
    println!("🔌 MCP server: {}", settings.mcp.server_url);
    match McpClient::new(&settings.mcp) {
        Ok(client) => {
            let client = Arc::new(client);
            match client.initialize_session(1).await {
                Ok(session_id) => {
                    let tools = McpToolManager::new(client.clone()).load_tools().await;
                    println!("   ✅ Session {} ({} tools)", session_id, tools.len());
                    if tools.is_empty() {
                        println!("   ⚠️  Server answered but listed no tools");
                        issues += 1;
                    }
                }
                Err(e) => {
                    println!("   ❌ Unreachable: {}", e);
                    issues += 1;
                }
            }
        }
        Err(e) => {
            println!("   ❌ {}", e);
            issues += 1;
        }
    }

    // Trading backend
    match BackendClient::new(&settings.backend) {
        Ok(backend) if backend.is_configured() => {
            println!("\n🏦 Trading backend: {}", settings.backend.base_url.as_deref().unwrap_or_default());
            if backend.has_token() {
                println!("   ✅ Bearer token configured");
            } else {
                println!("   ⚠️  BE_API_TOKEN not set, protected endpoints will fail");
                issues += 1;
            }
            if !settings.backend.verify_ssl {
                println!("   ⚠️  TLS verification disabled");
            }
        }
        Ok(_) => {
            println!("\n🏦 Trading backend: not configured");
            println!("   ❌ Set BE_API to enable trading tools");
            issues += 1;
        }
        Err(e) => {
            println!("\n🏦 Trading backend: {}", e);
            issues += 1;
        }
    }

    // Language model
    let models = ModelManager::from_settings(&settings.llm);
    println!("\n🤖 Provider: {} (model {})", models.provider().as_str(), models.current_model());
    if models.api_key().is_some() {
        println!("   ✅ API key configured");
    } else {
        println!("   ❌ No API key for {}", models.provider().as_str());
        issues += 1;
    }

    let now = current_datetime_info();
    println!(
        "\n🕒 Market time: {} {} (trading hours: {})",
        now.date,
        now.time,
        if now.is_trading_hours { "yes" } else { "no" }
    );

    println!();
    if issues == 0 {
        println!("✅ All checks passed");
    } else {
        println!("⚠️  {} issue(s) found", issues);
        std::process::exit(1);
    }
}
