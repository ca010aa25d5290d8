use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "food-ai")]
#[command(about = "食品写真から栄養成分を検出するサーバー", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// 詳細ログを出力
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// 設定ファイル（デフォルト: ~/.config/food-ai/config.json）
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// HTTPサーバーを起動
    Serve {
        /// 待ち受けアドレス
        #[arg(long)]
        host: Option<String>,

        /// ポート番号
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// ローカルの画像を1枚解析してJSONを出力
    Detect {
        /// 画像ファイル (png/jpg/jpeg/gif)
        #[arg(required = true)]
        image: PathBuf,

        /// 履歴に保存しない
        #[arg(long)]
        no_history: bool,
    },

    /// 食品名で栄養成分を検索
    Lookup {
        /// 食品名（大文字小文字は区別しない）
        #[arg(required = true)]
        name: String,
    },

    /// 履歴管理
    History {
        /// 履歴ファイルを削除
        #[arg(long)]
        clear: bool,

        /// 履歴情報を表示
        #[arg(long)]
        info: bool,
    },

    /// 設定を表示/初期化
    Config {
        /// 設定を表示
        #[arg(long)]
        show: bool,

        /// デフォルト設定をファイルに書き出す
        #[arg(long)]
        init: bool,
    },
}
