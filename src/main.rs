use std::io;
use std::process::ExitCode;

use clap::Parser;

use bsv_tx_builder::cli::CliArgs;
use bsv_tx_builder::commands;

fn main() -> ExitCode {
    env_logger::init();

    let args = CliArgs::parse();
    log::debug!("アプリケーションを開始します。引数: {:?}", args);

    let stdout = io::stdout();
    let mut out = stdout.lock();
    match commands::run(args, &mut out) {
        Ok(()) => {
            log::info!("処理が正常に完了しました。");
            ExitCode::SUCCESS
        }
        Err(e) => {
            log::error!("処理に失敗しました: {}", e);
            eprintln!("エラー: {}", e);
            ExitCode::from(e.exit_code())
        }
    }
}
