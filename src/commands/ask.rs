use crate::commands::build_app_state;
use crate::config::Settings;
use crate::constants::DEFAULT_USER_ID;
use crate::models::ChatMessage;
use crate::server;
use crate::services::suggestion::generate_suggestions;
use crate::services::ui_parser::{extract_intent, parse_ui_effects};

pub async fn run(message: String, user_id: Option<String>, session_id: Option<String>) {
    server::init_tracing();

    let state = match build_app_state(Settings::from_env()).await {
        Ok(state) => state,
        Err(e) => {
            eprintln!("❌ Failed to initialize: {}", e);
            std::process::exit(1);
        }
    };

    let user_id = user_id.unwrap_or_else(|| DEFAULT_USER_ID.to_string());
    let session_id = session_id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    println!("💬 [{} / {}] {}\n", user_id, session_id, message);

    let output = match state.agent.run(&user_id, &session_id, &message).await {
        Ok(output) => output,
        Err(e) => {
            eprintln!("❌ Agent runner error: {}", e);
            std::process::exit(1);
        }
    };

    for event in output.events.iter().filter(|e| e.tool.is_some()) {
        println!("🔧 {}", event.tool.as_deref().unwrap_or_default());
    }
    println!("{}\n", output.reply);

    let ui_effects = parse_ui_effects(&output.reply, &message);
    let intent = extract_intent(&output.reply, &message);
    if let Some(intent) = intent {
        println!("🎯 Intent: {}", intent.as_str());
    }
    for effect in &ui_effects {
        println!("🖥️  UI effect: {}", effect.type_name());
    }

    let history = [ChatMessage::user(message.clone())];
    for suggestion in generate_suggestions(&output.reply, &message, intent, &history, &ui_effects) {
        println!("{} {}  ({})", suggestion.icon, suggestion.text, suggestion.action);
    }
}
