mod commands;
mod session;

use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "stackflow")]
#[command(about = "ワークロードマニフェストから CloudFormation テンプレートを生成", long_about = None)]
struct Cli {
    /// 詳細なログを出力
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// テンプレートとパラメータファイルを生成
    Package(PackageArgs),
    /// マニフェストを解決して検証
    Validate {
        /// ワークロード名
        name: String,
        /// 環境名
        #[arg(short, long, env = "STACKFLOW_ENV")]
        env: String,
    },
    /// ワークスペース内のワークロード一覧を表示
    List,
    /// バージョン情報を表示
    Version,
}

#[derive(Args, Debug, Clone)]
pub struct PackageArgs {
    /// ワークロード名
    pub name: String,

    /// 環境名
    #[arg(short, long, env = "STACKFLOW_ENV")]
    pub env: String,

    /// アプリケーション名
    #[arg(long, env = "STACKFLOW_APP")]
    pub app: String,

    /// サービスディスカバリのエンドポイント (例: test.my-app.local)
    #[arg(long)]
    pub sd_endpoint: String,

    /// 環境スタックのバージョン
    #[arg(long)]
    pub env_version: String,

    /// アップロード済みアドオンテンプレートの URL
    #[arg(long)]
    pub addons_url: Option<String>,

    /// 出力ディレクトリ（省略時はカレントディレクトリ）
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,

    /// `build` イメージのタグ（設定ファイルの image_tag より優先）
    #[arg(long)]
    pub tag: Option<String>,

    /// `build` イメージのレジストリ（設定ファイルの registry より優先）
    #[arg(long)]
    pub registry: Option<String>,
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(e) = run(cli) {
        eprintln!();
        eprintln!("{}", "✗ エラー".red().bold());
        for cause in e.chain() {
            eprintln!("  {}", cause);
        }
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    // Versionコマンドは設定ファイル不要
    if matches!(cli.command, Commands::Version) {
        println!("stackflow {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let workspace = stackflow_core::Workspace::discover()?;
    tracing::debug!(root = %workspace.root().display(), "ワークスペースを検出しました");

    match cli.command {
        Commands::Package(args) => {
            let settings = stackflow_config::Settings::load()?;
            commands::package::handle(&workspace, &settings, &args)?;
        }
        Commands::Validate { name, env } => {
            commands::validate::handle(&workspace, &name, &env)?;
        }
        Commands::List => {
            commands::list::handle(&workspace)?;
        }
        Commands::Version => unreachable!("Version is handled before workspace discovery"),
    }

    Ok(())
}
