use crate::commands::{open_database, prepare, CommandResult};
use rxroute_db::migrations;

pub fn run() -> CommandResult {
    let (config, runtime) = match prepare("migrate") {
        Ok(prepared) => prepared,
        Err(result) => return result,
    };

    let result = runtime.block_on(async {
        let pool = open_database(&config).await?;
        let version = migrations::current_version(&pool)
            .await
            .map_err(|error| ("migration", error.to_string(), 5u8))?;
        pool.close().await;
        Ok::<Option<i64>, (&'static str, String, u8)>(version)
    });

    match result {
        Ok(Some(version)) => CommandResult::success(
            "migrate",
            format!("applied pending migrations (schema version {version})"),
        ),
        Ok(None) => CommandResult::success("migrate", "applied pending migrations"),
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("migrate", error_class, message, exit_code)
        }
    }
}
