use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use quaver_mirror::{DatabaseConfig, MirrorConfig, MirrorService, SyncRequest};
use tower::Service;
use tracing_subscriber::EnvFilter;

/// Quaverのランク譜面をミラーリングする
#[derive(Debug, Parser)]
#[command(name = "quaver-mirror", version, about)]
struct Cli {
    /// ブラウザを表示する
    #[arg(long)]
    headed: bool,

    /// DBに存在するMapsetも再同期する
    #[arg(long, env = "FORCE_SYNC")]
    force_sync: bool,

    /// 保存済みのアーカイブも再ダウンロードする
    #[arg(long)]
    redownload: bool,

    /// S3ではなくローカルディレクトリに保存する
    #[arg(long)]
    local: bool,

    #[arg(long, env = "DOWNLOAD_DIR", default_value = "./download")]
    download_dir: PathBuf,

    #[arg(long, env = "SESSION_FILE", default_value = "storageState.json")]
    session_file: PathBuf,

    #[arg(long, env = "BUCKET_NAME")]
    bucket: Option<String>,

    #[arg(long, env = "AWS_REGION", default_value = "us-east-1")]
    region: String,

    #[arg(long, env = "DATABASE_HOST")]
    database_host: Option<String>,

    #[arg(long, env = "DATABASE_USER", default_value = "root")]
    database_user: String,

    #[arg(long, env = "DATABASE_PASSWORD", default_value = "", hide_env_values = true)]
    database_password: String,

    #[arg(long, env = "DATABASE_NAME", default_value = "quaver")]
    database_name: String,

    /// プロンプトの代わりに使う quaver_session
    #[arg(long, env = "QUAVER_SESSION", hide_env_values = true)]
    session_token: Option<String>,

    #[arg(long, env = "CHROME_PATH")]
    chrome_path: Option<PathBuf>,

    /// チャレンジ通過待ちの上限（秒）
    #[arg(long, default_value_t = 60)]
    load_timeout: u64,

    /// デバッグ出力（スクリーンショット等）
    #[arg(long)]
    debug: bool,
}

impl Cli {
    fn config(&self) -> MirrorConfig {
        let mut config = MirrorConfig::new()
            .with_headless(!self.headed)
            .with_debug(self.debug)
            .with_download_path(&self.download_dir)
            .with_session_path(&self.session_file)
            .with_region(&self.region)
            .with_load_timeout(Duration::from_secs(self.load_timeout));

        if let Some(bucket) = &self.bucket {
            config = config.with_bucket(bucket);
        }
        if let Some(host) = &self.database_host {
            config = config.with_database(
                DatabaseConfig::new(host, &self.database_user, &self.database_password)
                    .with_database(&self.database_name),
            );
        }
        if let Some(token) = &self.session_token {
            config = config.with_session_token(token);
        }
        if let Some(path) = &self.chrome_path {
            config = config.with_chrome_path(path);
        }
        config
    }

    fn request(&self) -> SyncRequest {
        SyncRequest::new()
            .with_force_sync(self.force_sync)
            .with_redownload(self.redownload)
            .with_upload(!self.local)
    }
}

async fn run(cli: Cli) -> ExitCode {
    let mut service = MirrorService::new(cli.config());

    match service.call(cli.request()).await {
        Ok(report) => {
            println!(
                "Done: {} mapsets, {} synced, {} downloaded, {} skipped, {} failed",
                report.total,
                report.synced,
                report.downloaded,
                report.skipped,
                report.failed.len()
            );
            if !report.failed.is_empty() {
                println!("Failed mapsets: {:?}", report.failed);
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("エラー: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn main() -> ExitCode {
    // .envは他のスレッドが起動する前に読む（既に設定済みの値は上書きしない）
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("エラー: tokioランタイムを起動できません: {}", e);
            return ExitCode::FAILURE;
        }
    };

    runtime.block_on(run(cli))
}
