use anyhow::Result;
use colored::Colorize;
use comfy_table::{presets::UTF8_FULL, Cell, Color, Table};

use morphika_core::modules::{config as core_config, paths, plan_catalog};
use morphika_types::models::AppConfig;

use crate::cli::ConfigCommands;

pub fn handle_plans(json: bool) -> Result<()> {
    let plans = plan_catalog::catalog();
    if json {
        println!("{}", serde_json::to_string_pretty(&plans)?);
        return Ok(());
    }

    let default_tier = core_config::load_config().map(|c| c.billing.default_tier).unwrap_or_default();

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec!["Tier", "Models", "Photos", "Trainings / period"]);
    for plan in plans {
        let tier = if plan.tier == default_tier {
            Cell::new(format!("{} (default)", plan.tier)).fg(Color::Green)
        } else {
            Cell::new(plan.tier)
        };
        table.add_row(vec![
            tier,
            Cell::new(plan.limits.max_models),
            Cell::new(plan.limits.max_photos),
            Cell::new(plan.limits.max_trainings),
        ]);
    }
    println!("{table}");
    Ok(())
}

pub fn handle_config_command(cmd: ConfigCommands) -> Result<()> {
    match cmd {
        ConfigCommands::Show { json } => show_config(json),
        ConfigCommands::Path => {
            let dir = paths::get_data_dir().map_err(|e| anyhow::anyhow!(e))?;
            println!("{}", dir.display());
            Ok(())
        },
        ConfigCommands::Init => {
            let config = core_config::load_config().map_err(|e| anyhow::anyhow!(e))?;
            core_config::save_config(&config).map_err(|e| anyhow::anyhow!(e))?;
            println!("{} Config written", "✓".green());
            Ok(())
        },
    }
}

fn show_config(json: bool) -> Result<()> {
    let config = core_config::load_config().map_err(|e| anyhow::anyhow!(e))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&config)?);
        return Ok(());
    }
    print_summary(&config);
    Ok(())
}

fn print_summary(config: &AppConfig) {
    println!("{}", "Server:".cyan().bold());
    println!("  Listen: {}:{}", config.server.host, config.server.port);
    println!("  Public URL: {}", config.server.public_url.as_deref().unwrap_or("-"));
    println!("  Persist state: {}", config.persist_state);

    println!("{}", "Collaborators:".cyan().bold());
    if config.supabase.is_enabled() {
        println!("  Supabase: {} (bucket {})", config.supabase.url, config.supabase.bucket);
        println!("  Service key: {}", secret_status(&config.supabase.service_key_env));
    } else {
        println!("  Supabase: {}", "in-memory".yellow());
    }
    if config.replicate.enabled {
        println!(
            "  Replicate: {}/{} @ {}",
            config.replicate.owner,
            config.replicate.model,
            short_version(&config.replicate.version)
        );
        println!("  API token: {}", secret_status(&config.replicate.token_env));
    } else {
        println!("  Replicate: {}", "in-memory".yellow());
    }

    println!("{}", "Billing:".cyan().bold());
    println!("  Default tier: {}", config.billing.default_tier);
    println!("  Webhook secret: {}", secret_status(&config.billing.webhook_secret_env));

    println!("{}", "Training:".cyan().bold());
    println!("  Images: {}..={}", config.training.min_images, config.training.max_images);
    println!(
        "  Poll: every {}s, backing off to {}s, giving up after {} min",
        config.training.poll_interval_secs,
        config.training.max_poll_interval_secs,
        config.training.poll_timeout_minutes
    );
}

/// Names the env var and whether it is set; never prints the value.
fn secret_status(env_var: &str) -> String {
    let set = std::env::var(env_var).is_ok_and(|v| !v.trim().is_empty());
    if set {
        format!("{} {}", env_var, "(set)".green())
    } else {
        format!("{} {}", env_var, "(missing)".red())
    }
}

fn short_version(version: &str) -> &str {
    version.get(..12).unwrap_or(version)
}
