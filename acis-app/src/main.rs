use std::path::PathBuf;

use acis_config::{AppConfig, ConfigError, ExportFormat};
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt};

mod commands;

enum Command {
    Info {
        input: PathBuf,
    },
    Convert {
        input: PathBuf,
        output: PathBuf,
        version: Option<u32>,
        format: Option<ExportFormat>,
    },
}

fn usage() -> ! {
    eprintln!("用法：acis-app [--config <路径>] info <文件>");
    eprintln!("      acis-app [--config <路径>] convert <输入> <输出> [--version N] [--sat|--sab]");
    std::process::exit(1);
}

fn main() {
    let mut args = std::env::args().skip(1);
    let mut config_override: Option<PathBuf> = None;
    let mut positional: Vec<String> = Vec::new();
    let mut version: Option<u32> = None;
    let mut format: Option<ExportFormat> = None;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--sat" => format = Some(ExportFormat::Sat),
            "--sab" => format = Some(ExportFormat::Sab),
            "--config" => {
                let Some(path) = args.next() else {
                    eprintln!("`--config` 需要提供配置文件路径");
                    std::process::exit(1);
                };
                config_override = Some(PathBuf::from(path));
            }
            "--version" => {
                let Some(value) = args.next().and_then(|v| v.parse::<u32>().ok()) else {
                    eprintln!("`--version` 需要提供整数版本号，例如 700");
                    std::process::exit(1);
                };
                version = Some(value);
            }
            other if other.starts_with("--") => {
                eprintln!("未知参数：{other}");
                std::process::exit(1);
            }
            other => positional.push(other.to_string()),
        }
    }

    let command = match positional.as_slice() {
        [name, input] if name == "info" => Command::Info {
            input: PathBuf::from(input),
        },
        [name, input, output] if name == "convert" => Command::Convert {
            input: PathBuf::from(input),
            output: PathBuf::from(output),
            version,
            format,
        },
        _ => usage(),
    };

    let config = load_configuration(config_override);
    init_logging(&config);

    let result = match command {
        Command::Info { input } => {
            info!(path = %input.display(), "读取 ACIS 文件");
            commands::info(&config, &input)
        }
        Command::Convert {
            input,
            output,
            version,
            format,
        } => {
            info!(input = %input.display(), output = %output.display(), "转换 ACIS 文件");
            commands::convert(&config, &input, &output, version, format)
        }
    };
    if let Err(err) = result {
        error!(error = %err, "命令执行失败");
        std::process::exit(1);
    }
}

fn load_configuration(override_path: Option<PathBuf>) -> AppConfig {
    match override_path {
        Some(path) => AppConfig::from_file(&path).unwrap_or_else(|err| {
            warn!(path = %path.display(), error = %err, "加载指定配置失败，使用默认配置");
            AppConfig::default()
        }),
        None => match AppConfig::discover() {
            Ok(cfg) => cfg,
            Err(err) => {
                match &err {
                    ConfigError::Io { path, .. } | ConfigError::Parse { path, .. } => {
                        warn!(path = %path.display(), error = %err, "加载默认配置失败，使用内建默认值");
                    }
                    ConfigError::Context { .. } => {
                        warn!(error = %err, "加载默认配置失败，使用内建默认值");
                    }
                }
                AppConfig::default()
            }
        },
    }
}

fn init_logging(config: &AppConfig) {
    let filter =
        EnvFilter::try_new(config.logging.level.clone()).unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt().with_env_filter(filter).with_writer(std::io::stderr);
    if subscriber.try_init().is_err() {
        // 已初始化，忽略
    }
}
