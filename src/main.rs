//! # asap-crop：命令行入口
//!
//! 本文件仅负责参数解析、日志初始化与结果输出。
//! 裁剪逻辑分布在各子模块中，详见 `lib.rs` 架构文档。

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use serde::Serialize;

use asap_crop::crop::{
    CropHandler, CropSession, ImageSource, LocalFile, ResampleProfile, SubmitOutcome,
};
use asap_crop::error::AppError;
use asap_crop::{settings, storage};

#[derive(Parser, Debug)]
#[command(
    name = "asap-crop",
    about = "Crop a project image to a square and store it under the owner's project folder",
    version
)]
struct Cli {
    /// Local image path, http(s) URL or data URL
    #[arg(short = 'i', long = "input")]
    input: String,

    /// Horizontal crop position in percent (0-100)
    #[arg(long = "x", default_value_t = 50.0, allow_negative_numbers = true)]
    x: f64,

    /// Vertical crop position in percent (0-100)
    #[arg(long = "y", default_value_t = 50.0, allow_negative_numbers = true)]
    y: f64,

    /// Zoom factor (1-10)
    #[arg(short = 'z', long = "zoom", default_value_t = 1.0, allow_negative_numbers = true)]
    zoom: f64,

    /// Base directory for stored project images
    #[arg(short = 'o', long = "out-dir", default_value = ".")]
    out_dir: PathBuf,

    /// Owner id used as the project folder name
    #[arg(long = "owner", default_value = "local")]
    owner: String,

    /// JSON settings file
    #[arg(short = 'c', long = "config")]
    config: Option<PathBuf>,

    /// Resample profile: quality, balanced or speed
    #[arg(short = 'p', long = "profile")]
    profile: Option<String>,

    /// Print the report as JSON
    #[arg(long = "json")]
    json: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Report {
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    mime_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    width: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    height: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stored_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    url: Option<String>,
    x_percent: f64,
    y_percent: f64,
    zoom: f64,
}

fn is_url_input(input: &str) -> bool {
    let lower = input.trim_start().to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://") || lower.starts_with("data:")
}

async fn run(cli: &Cli) -> Result<Report, AppError> {
    let config = settings::load_config(cli.config.as_deref())?;
    let max_file_size = config.max_file_size;
    let handler = CropHandler::new(config)?;

    if let Some(profile) = cli.profile.as_deref() {
        handler.set_resample_profile(ResampleProfile::parse(profile)?)?;
    }

    let source = if is_url_input(&cli.input) {
        ImageSource::Url(cli.input.trim().to_string())
    } else {
        ImageSource::File(LocalFile::from_path(
            PathBuf::from(&cli.input).as_path(),
            max_file_size,
        )?)
    };

    let mut session = CropSession::new();
    session.select_source(source);
    session.set_crop_position(cli.x, cli.y);
    session.set_zoom(cli.zoom);

    let position = session.position();
    let mut report = Report {
        status: "no-image",
        name: None,
        mime_type: None,
        width: None,
        height: None,
        stored_path: None,
        url: None,
        x_percent: position.x_percent,
        y_percent: position.y_percent,
        zoom: session.zoom().value(),
    };

    match session.prepare_for_submit(&handler).await {
        SubmitOutcome::Cropped(image) => {
            let path = storage::store_project_image(
                &cli.out_dir,
                &cli.owner,
                &image.name,
                &image.bytes,
            )?;
            report.status = "cropped";
            report.name = Some(image.name);
            report.mime_type = Some(image.mime_type.to_string());
            report.width = Some(image.width);
            report.height = Some(image.height);
            report.stored_path = Some(path.to_string_lossy().to_string());
        }
        SubmitOutcome::Original(ImageSource::File(file)) => {
            let path = storage::store_project_image(
                &cli.out_dir,
                &cli.owner,
                &file.name,
                &file.bytes,
            )?;
            report.status = "original";
            report.name = Some(file.name);
            report.mime_type = file.mime_type;
            report.stored_path = Some(path.to_string_lossy().to_string());
        }
        SubmitOutcome::Original(ImageSource::Url(url)) => {
            report.status = "original-url";
            report.url = Some(if url.starts_with("data:") {
                "<data-url>".to_string()
            } else {
                url
            });
        }
        SubmitOutcome::Discarded => report.status = "discarded",
        SubmitOutcome::NoImage => {}
    }

    Ok(report)
}

fn print_report(report: &Report) {
    println!("status: {}", report.status);
    if let Some(name) = &report.name {
        println!("name: {}", name);
    }
    if let (Some(width), Some(height)) = (report.width, report.height) {
        println!("size: {}x{}", width, height);
    }
    if let Some(path) = &report.stored_path {
        println!("stored: {}", path);
    }
    if let Some(url) = &report.url {
        println!("url: {}", url);
    }
    println!(
        "crop: x={:.3}% y={:.3}% zoom={:.2}",
        report.x_percent, report.y_percent, report.zoom
    );
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    match run(&cli).await {
        Ok(report) => {
            if cli.json {
                match serde_json::to_string_pretty(&report) {
                    Ok(json) => println!("{}", json),
                    Err(err) => {
                        log::error!("序列化结果失败: {err}");
                        return ExitCode::FAILURE;
                    }
                }
            } else {
                print_report(&report);
            }
            ExitCode::SUCCESS
        }
        Err(err) => {
            if cli.json {
                let payload = serde_json::json!({ "status": "error", "error": err });
                println!("{}", payload);
            }
            log::error!("处理失败: {err}");
            ExitCode::FAILURE
        }
    }
}
