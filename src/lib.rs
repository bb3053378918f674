// ApneaScope - Minute-wise sleep apnea screening from heartbeat timing
// Module declarations

pub mod config;
pub mod detect;
pub mod diagnosis;
pub mod heart;
pub mod pipeline;
pub mod report;
pub mod samples;
pub mod state;

#[cfg(feature = "desktop")]
mod commands;

#[cfg(feature = "desktop")]
fn resolve_resource(app: &tauri::App, path: &std::path::Path) -> std::path::PathBuf {
    use tauri::Manager;

    if path.is_absolute() || path.exists() {
        return path.to_path_buf();
    }
    match app.path().resource_dir() {
        Ok(dir) => dir.join(path),
        Err(_) => path.to_path_buf(),
    }
}

#[cfg(feature = "desktop")]
#[cfg_attr(mobile, tauri::mobile_entry_point)]
pub fn run() {
    use std::sync::Arc;
    use tauri::Manager;

    tauri::Builder::default()
        .plugin(tauri_plugin_dialog::init())
        .plugin(tauri_plugin_fs::init())
        .setup(|app| {
            if cfg!(debug_assertions) {
                app.handle().plugin(
                    tauri_plugin_log::Builder::default()
                        .level(log::LevelFilter::Info)
                        .build(),
                )?;
            }

            let config = config::AppConfig::from_default_location().map_err(|e| {
                log::error!("Failed to load configuration: {}", e);
                e
            })?;

            // Without a model there is nothing to evaluate with
            let model_path = resolve_resource(app, &config.model.path);
            let bundle = detect::ModelBundle::load(&model_path).map_err(|e| {
                log::error!("Failed to load model from {}: {}", model_path.display(), e);
                e
            })?;

            let paths = state::AppPaths::from_data_dir()?;
            let db = state::init_db(&paths.db_path()).map_err(|e| {
                log::error!("Failed to initialize database: {}", e);
                e
            })?;
            app.manage(db);

            let evaluator =
                pipeline::Evaluator::new(Arc::new(bundle), config.duration, config.features);
            app.manage(commands::AppState {
                evaluator: Arc::new(evaluator),
                samples: Arc::new(samples::SampleStore::new(resolve_resource(
                    app,
                    &config.samples.dir,
                ))),
                paths: Arc::new(paths),
            });

            log::info!("ApneaScope initialized successfully");
            Ok(())
        })
        .invoke_handler(tauri::generate_handler![
            commands::evaluate_upload,
            commands::evaluate_sample,
            commands::list_samples,
            commands::get_model_info,
            commands::list_recordings,
            commands::get_recording,
            commands::list_evaluations_for_recording,
            commands::get_evaluation,
        ])
        .run(tauri::generate_context!())
        .expect("error while running tauri application");
}
