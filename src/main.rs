use clap::Parser;
use food_ai_common::{DetectResponse, ReferenceTable};
use food_ai_rust::{cli, config, error, history, server, workspace};
use cli::{Cli, Commands};
use config::Config;
use error::{FoodAiError, Result};
use tracing_subscriber::{fmt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // RUST_LOG が優先
    let default_level = if cli.verbose { "debug" } else { "info" };
    fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    let config_path = cli.config.clone();
    let load_config = || Config::load(config_path.as_deref());

    match cli.command {
        Commands::Serve { host, port } => {
            let mut config = load_config()?;
            if let Some(host) = host {
                config.host = host;
            }
            if let Some(port) = port {
                config.port = port;
            }

            server::serve(&config).await?;
        }

        Commands::Detect { image, no_history } => {
            if !image.exists() {
                return Err(FoodAiError::FileNotFound(image.display().to_string()));
            }

            let file_name = image
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();
            if !workspace::is_allowed_file(&file_name) {
                return Err(FoodAiError::InvalidFileType(file_name));
            }

            let config = load_config()?;
            let pipeline = server::build_pipeline(&config)?;
            let nutrients = tokio::task::spawn_blocking(move || {
                if no_history {
                    pipeline.detect_nutrients(&image)
                } else {
                    pipeline.analyze(&image)
                }
            })
            .await
            .map_err(|e| FoodAiError::Inference(e.to_string()))??;

            let json = serde_json::to_string_pretty(&DetectResponse { nutrients })?;
            println!("{}", json);
        }

        Commands::Lookup { name } => {
            let config = load_config()?;
            let table = ReferenceTable::from_csv(&config.reference_path)?;

            match table.lookup(&name) {
                Some(record) => println!("{}", serde_json::to_string_pretty(&record)?),
                None => println!("該当する食品がありません: {}", name),
            }
        }

        Commands::History { clear, info } => {
            let config = load_config()?;
            let recorder = history::HistoryRecorder::new(&config.history_path);
            let path = recorder.path().to_path_buf();

            if info || !clear {
                // デフォルトまたは--info: 情報表示
                if path.exists() {
                    println!("履歴情報:");
                    println!("  パス: {}", path.display());
                    match recorder.load() {
                        Ok(records) => println!("  件数: {}", records.len()),
                        Err(e) => println!("  読み込みエラー: {}", e),
                    }
                    if let Ok(meta) = std::fs::metadata(&path) {
                        println!("  サイズ: {} bytes", meta.len());
                    }
                } else {
                    println!("履歴ファイルが存在しません: {}", path.display());
                }
            }

            if clear {
                match recorder.clear() {
                    Ok(true) => println!("✔ 履歴を削除しました: {}", path.display()),
                    Ok(false) => println!("履歴ファイルが存在しません"),
                    Err(e) => println!("履歴削除エラー: {}", e),
                }
            }
        }

        Commands::Config { show, init } => {
            if init {
                let saved = Config::default().save(config_path.as_deref())?;
                println!("✔ デフォルト設定を書き出しました: {}", saved.display());
            }

            let config = load_config()?;

            if show || !init {
                println!("設定:");
                println!("  待ち受け: {}", config.bind_address());
                println!("  モデル: {}", config.model_path.display());
                println!("  クラス名: {}", config.labels_path.display());
                println!("  参照テーブル: {}", config.reference_path.display());
                println!("  履歴: {}", config.history_path.display());
                println!("  アップロード先: {}", config.upload_dir.display());
                println!("  入力サイズ: {}px", config.input_size);
                println!("  信頼度閾値: {}", config.conf_threshold);
                println!("  最大アップロード: {} bytes", config.max_upload_bytes);
            }
        }
    }

    Ok(())
}
