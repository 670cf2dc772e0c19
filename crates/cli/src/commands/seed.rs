use crate::commands::{self, CommandResult};
use leadflow_core::config::{AppConfig, LoadOptions};
use leadflow_db::{connect, migrations, DemoDataset, SeedSummary};

pub fn run() -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "seed",
                "config_validation",
                format!("configuration issue: {error}"),
                2,
            );
        }
    };

    let runtime = match commands::current_thread_runtime() {
        Ok(runtime) => runtime,
        Err(error) => {
            return CommandResult::failure(
                "seed",
                "runtime_init",
                format!("failed to initialize async runtime: {error}"),
                3,
            );
        }
    };

    let result = runtime.block_on(async {
        let pool = connect(&config.database)
            .await
            .map_err(|error| ("db_connectivity", error.to_string(), 4u8))?;

        migrations::run_pending(&pool)
            .await
            .map_err(|error| ("migration", error.to_string(), 5u8))?;

        let summary = DemoDataset::load(&pool)
            .await
            .map_err(|error| ("seed_execution", error.to_string(), 5u8))?;

        let verification = DemoDataset::verify(&pool)
            .await
            .map_err(|error| ("seed_verification", error.to_string(), 6u8))?;

        let run_result: Result<SeedSummary, (&'static str, String, u8)> =
            if verification.all_present {
                Ok(summary)
            } else {
                let failed_checks = verification
                    .checks
                    .iter()
                    .filter_map(|(check, passed)| (!passed).then_some(*check))
                    .collect::<Vec<_>>();
                let message = if failed_checks.is_empty() {
                    "some seed data failed to load".to_string()
                } else {
                    format!("seed verification failed for checks: {}", failed_checks.join(", "))
                };
                Err(("seed_verification", message, 6u8))
            };

        pool.close().await;
        run_result
    });

    match result {
        Ok(summary) => {
            let workflow_lines: Vec<String> = summary
                .workflows
                .iter()
                .map(|w| format!("  - {}: {} ({})", w.stage, w.workflow_id, w.name))
                .collect();
            let message = format!(
                "demo catalog loaded with {} workflows and one demo subject:\n{}",
                summary.workflows.len(),
                workflow_lines.join("\n")
            );
            CommandResult::success("seed", message)
        }
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("seed", error_class, message, exit_code)
        }
    }
}
