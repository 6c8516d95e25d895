//! NetWarden CLI
//!
//! Operator tool for inspecting rule text and user-data backups.

use std::fs;

use clap::{Parser, Subcommand};

use nw_core::{codec, FirewallAction, PolicyStore, RequestKind, RuleAction, RuleMatrix, UrlAction};
use nw_router::UserDataBackup;

#[derive(Parser)]
#[command(name = "nw-cli")]
#[command(about = "NetWarden rule and backup inspection tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate a (source, destination, kind) triple against a rules file
    Evaluate {
        /// Rule text file
        #[arg(short, long)]
        rules: String,

        /// Source hostname
        #[arg(short, long)]
        source: String,

        /// Destination hostname or URL
        #[arg(short, long)]
        destination: String,

        /// Request kind tag
        #[arg(short, long, default_value = "other")]
        kind: String,
    },

    /// Parse rule text and print it back in canonical order
    Normalize {
        /// Rule text file
        #[arg(short, long)]
        input: String,
    },

    /// Summarize a user-data backup payload
    Info {
        /// Backup JSON file
        #[arg(short, long)]
        backup: String,
    },
}

fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Evaluate {
            rules,
            source,
            destination,
            kind,
        } => cmd_evaluate(&rules, &source, &destination, &kind),
        Commands::Normalize { input } => cmd_normalize(&input),
        Commands::Info { backup } => cmd_info(&backup),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn cmd_evaluate(rules: &str, source: &str, destination: &str, kind: &str) -> Result<(), String> {
    let text = fs::read_to_string(rules).map_err(|e| format!("Failed to read '{rules}': {e}"))?;
    let kind = RequestKind::from_token(kind).ok_or_else(|| format!("Unknown kind '{kind}'"))?;

    // URL destinations are judged by the URL-rule matrix, hostnames by
    // the firewall matrix.
    if destination.contains('/') {
        let matrix: RuleMatrix<UrlAction> = codec::parse(&text);
        let decision = matrix.evaluate(source, destination, kind);
        print_decision(decision.action.as_token(), decision.tier);
    } else {
        let matrix: RuleMatrix<FirewallAction> = codec::parse(&text);
        let decision = matrix.evaluate(source, destination, kind);
        print_decision(decision.action.as_token(), decision.tier);
    }
    Ok(())
}

fn print_decision(action: &str, tier: Option<nw_core::MatchTier>) {
    match tier {
        Some(tier) => println!("{action} (tier {})", tier.rank()),
        None => println!("{action} (no matching rule)"),
    }
}

fn cmd_normalize(input: &str) -> Result<(), String> {
    let text = fs::read_to_string(input).map_err(|e| format!("Failed to read '{input}': {e}"))?;

    let mut store = PolicyStore::new();
    store.modify_ruleset(true, &text, "");
    for line in store.ruleset_lines(true) {
        println!("{line}");
    }
    Ok(())
}

fn cmd_info(backup: &str) -> Result<(), String> {
    let text = fs::read_to_string(backup).map_err(|e| format!("Failed to read '{backup}': {e}"))?;
    let data: UserDataBackup =
        serde_json::from_str(&text).map_err(|e| format!("Failed to parse '{backup}': {e}"))?;

    let firewall: RuleMatrix<FirewallAction> = codec::parse(&data.firewall_rules);
    let switches: RuleMatrix<nw_core::SwitchState> = codec::parse(&data.switches);
    let url_rules: RuleMatrix<UrlAction> = codec::parse(&data.url_rules);

    println!("Version:        {}", data.version);
    println!("Timestamp:      {}", data.time_stamp);
    println!("Firewall rules: {}", firewall.len());
    println!("Switch rules:   {}", switches.len());
    println!("URL rules:      {}", url_rules.len());
    println!("Selected lists: {}", data.selected_lists.len());
    println!(
        "User filters:   {} lines",
        data.user_filters.lines().count()
    );
    Ok(())
}
