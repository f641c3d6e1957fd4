use colored::Colorize;
use tokio::sync::watch;

use acqknowledge_ndt::{Lifecycle, Outcome, Phase, RunMode, RunSummary};

pub fn print_banner(lifecycle: &Lifecycle) {
    let config = lifecycle.config();
    println!(
        "{} AcqKnowledge NDT Relay",
        "╔══════════════════════════════════╗\n║".bright_blue()
    );
    println!("{}", "╚══════════════════════════════════╝".bright_blue());

    if config.control.discover {
        println!(
            "Control:  {} {}",
            "autodiscover".cyan(),
            config.control.candidates.join(", ").dimmed()
        );
    } else {
        println!("Control:  {}", config.control.addr().cyan());
    }

    match lifecycle.mode() {
        RunMode::Relay => {
            let mut targets = Vec::new();
            if config.console.enabled {
                targets.push("console".to_string());
            }
            if config.osc.enabled {
                targets.push(format!("osc {}{}", config.osc.addr(), config.osc.address));
            }
            println!("Mode:     {} -> {}", "relay".green(), targets.join(", ").cyan());
        }
        RunMode::Forward => println!(
            "Mode:     {} -> {}:{}",
            "forward".green(),
            config.data.host.cyan(),
            config.data.port.to_string().cyan()
        ),
    }
    println!("Press {} to stop.\n", "Ctrl+C".bold());
}

pub fn format_phase(phase: Phase) -> String {
    match phase {
        Phase::Idle => "idle".dimmed().to_string(),
        Phase::Configuring => "configuring".yellow().to_string(),
        Phase::Acquiring => "acquiring".green().to_string(),
        Phase::Draining => "draining".yellow().to_string(),
        Phase::Stopped => "stopped".dimmed().to_string(),
    }
}

/// Print each phase change until the lifecycle is dropped.
pub async fn report_phases(mut phases: watch::Receiver<Phase>) {
    while phases.changed().await.is_ok() {
        let phase = *phases.borrow_and_update();
        eprintln!("{} {}", "Phase:".bright_blue(), format_phase(phase));
    }
}

pub fn print_summary(summary: &RunSummary) {
    let outcome = match summary.outcome {
        Outcome::Completed => "acquisition completed".green(),
        Outcome::Interrupted => "interrupted".yellow(),
    };
    println!("\n{} {}", "Run finished:".bold(), outcome);
    println!(
        "  Server:   {}:{}",
        summary.session.host.cyan(),
        summary.session.port.to_string().cyan()
    );
    println!(
        "  Channels: {}",
        summary
            .session
            .channels
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ")
    );
    if summary.mode == RunMode::Relay {
        println!("  Frames:   {}", summary.frames_forwarded.to_string().cyan());
    }
    println!("{}", "Goodbye!".green());
}
