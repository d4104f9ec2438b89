use crate::commands::{open_database, prepare, CommandResult};
use rxroute_db::DemoSeedDataset;

pub fn run() -> CommandResult {
    let (config, runtime) = match prepare("seed") {
        Ok(prepared) => prepared,
        Err(result) => return result,
    };

    let result = runtime.block_on(async {
        let pool = open_database(&config).await?;

        let seed_result = DemoSeedDataset::load(&pool)
            .await
            .map_err(|error| ("seed_execution", error.to_string(), 5u8))?;
        let verification = DemoSeedDataset::verify(&pool)
            .await
            .map_err(|error| ("seed_verification", error.to_string(), 5u8))?;
        pool.close().await;

        if !verification.all_present {
            let failed_checks = verification
                .checks
                .iter()
                .filter_map(|(check, passed)| (!passed).then_some(*check))
                .collect::<Vec<_>>();
            return Err((
                "seed_verification",
                format!("Seed verification failed for checks: {}", failed_checks.join(", ")),
                5u8,
            ));
        }

        Ok::<String, (&'static str, String, u8)>(summary(
            &seed_result.pharmacies_seeded,
            &seed_result.products_seeded,
        ))
    });

    match result {
        Ok(message) => CommandResult::success("seed", message),
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("seed", error_class, message, exit_code)
        }
    }
}

fn summary(pharmacies: &[&str], products: &[&str]) -> String {
    let mut lines = vec![format!(
        "Loaded demo catalog: {} pharmacies, {} products",
        pharmacies.len(),
        products.len()
    )];
    lines.extend(pharmacies.iter().map(|id| format!("  - pharmacy: {id}")));
    lines.extend(products.iter().map(|id| format!("  - product: {id}")));
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::summary;

    #[test]
    fn summary_lists_every_seeded_row() {
        let message = summary(&["ph-a", "ph-b"], &["prod-1"]);
        assert_eq!(
            message,
            "Loaded demo catalog: 2 pharmacies, 1 products\n  - pharmacy: ph-a\n  - pharmacy: ph-b\n  - product: prod-1"
        );
    }
}
