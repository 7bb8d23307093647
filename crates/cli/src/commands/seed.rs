use tendero_db::{DemoCatalog, VerificationResult};

use crate::commands::{async_runtime, load_config, migrated_pool, CommandResult};

pub fn run() -> CommandResult {
    let config = match load_config("seed") {
        Ok(config) => config,
        Err(failure) => return failure,
    };
    let runtime = match async_runtime("seed") {
        Ok(runtime) => runtime,
        Err(failure) => return failure,
    };

    let result = runtime.block_on(async {
        let pool = migrated_pool(&config).await?;

        // Loading twice would collide on product ids; an intact catalog is left alone.
        let existing = DemoCatalog::verify(&pool)
            .await
            .map_err(|error| ("seed_verification", error.to_string(), 6u8))?;
        let loaded = if existing.all_present {
            false
        } else {
            DemoCatalog::load(&pool)
                .await
                .map_err(|error| ("seed_execution", error.to_string(), 5u8))?;
            true
        };

        let verification = DemoCatalog::verify(&pool)
            .await
            .map_err(|error| ("seed_verification", error.to_string(), 6u8))?;
        pool.close().await;

        if !verification.all_present {
            return Err(("seed_verification", verification_failure_message(&verification), 6u8));
        }
        Ok(SeedOutput { loaded, products: verification.checks.len() })
    });

    match result {
        Ok(output) => {
            let action = if output.loaded { "loaded" } else { "already present" };
            CommandResult::success(
                "seed",
                format!("demo catalog {action}: {} products verified", output.products),
            )
        }
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("seed", error_class, message, exit_code)
        }
    }
}

struct SeedOutput {
    loaded: bool,
    products: usize,
}

fn verification_failure_message(verification: &VerificationResult) -> String {
    let failed_checks = verification
        .checks
        .iter()
        .filter_map(|(check, passed)| (!passed).then_some(*check))
        .collect::<Vec<_>>();
    if failed_checks.is_empty() {
        "Some seed data failed to load".to_string()
    } else {
        format!("Seed verification failed for checks: {}", failed_checks.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use tendero_db::VerificationResult;

    use super::verification_failure_message;

    #[test]
    fn verification_error_message_targets_failed_checks() {
        let verification = VerificationResult {
            all_present: false,
            checks: vec![
                ("Nitrile Gloves", true),
                ("Safety Helmet White", false),
                ("Traffic Cone Orange", false),
            ],
        };

        assert_eq!(
            verification_failure_message(&verification),
            "Seed verification failed for checks: Safety Helmet White, Traffic Cone Orange"
        );
    }

    #[test]
    fn verification_error_message_falls_back_to_generic_when_no_labels() {
        let verification = VerificationResult { all_present: false, checks: Vec::new() };
        assert_eq!(verification_failure_message(&verification), "Some seed data failed to load");
    }
}
