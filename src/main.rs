use std::{sync::Arc, time::Duration};

use calcapiship::{
    Calculator, Error, Outcome, RequestContext, Result,
    apiship::{Client, TokenManager, TomlTokenStore},
    cache::{self, CacheStore, FileStore},
    calculator::Order,
    config::{self, Config},
    settings::SettingsSync,
};
use tracing_subscriber::EnvFilter;

const LOGO: &str = r#"
            __                  _     _     _
  ___ __ _ | | ___ __ _ _ __  (_)___| |__ (_)_ __
 / __/ _` || |/ __/ _` | '_ \ | / __| '_ \| | '_ \
| (_| (_| || | (_| (_| | |_) || \__ \ | | | | |_) |
 \___\__,_||_|\___\__,_| .__/ |_|___/_| |_|_| .__/
                       |_|                  |_|
"#;

const USAGE: &str = "Использование:
  calcapiship quote <order.json> [session]
  calcapiship summary [session]
  calcapiship sync
  calcapiship address
  calcapiship tariffs <provider> [page]";

const DEFAULT_SESSION: &str = "cli";

/// Период очистки просроченных записей кэша
const SWEEP_INTERVAL: Duration = Duration::from_secs(60 * 60);

enum Command {
    Quote { order_path: String, session: String },
    Summary { session: String },
    Sync,
    Address,
    Tariffs { provider: String, page: u64 },
}

impl Command {
    fn parse(mut args: impl Iterator<Item = String>) -> Result<Self> {
        let usage = || Error::Custom(USAGE.to_string());
        let command = args.next().ok_or_else(usage)?;
        let session = |s: Option<String>| s.unwrap_or_else(|| DEFAULT_SESSION.to_string());

        match command.as_str() {
            "quote" => Ok(Self::Quote {
                order_path: args.next().ok_or_else(usage)?,
                session: session(args.next()),
            }),
            "summary" => Ok(Self::Summary {
                session: session(args.next()),
            }),
            "sync" => Ok(Self::Sync),
            "address" => Ok(Self::Address),
            "tariffs" => {
                let provider = args.next().ok_or_else(usage)?;
                let page = match args.next() {
                    Some(p) => p.parse().map_err(|_| usage())?,
                    None => 1,
                };
                Ok(Self::Tariffs { provider, page })
            }
            _ => Err(usage()),
        }
    }
}

/// Обработка сигнала завершения (Ctrl+C или SIGINT/SIGTERM)
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        match (signal(SignalKind::interrupt()), signal(SignalKind::terminate())) {
            (Ok(mut sigint), Ok(mut sigterm)) => {
                tokio::select! {
                    _ = sigint.recv() => {},
                    _ = sigterm.recv() => {},
                }
            }
            _ => {
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }

    tracing::info!("Завершение по сигналу...");
}

/// Инициализация конфигурации и журналирования
fn startup() -> Result<Config> {
    // Новый файл конфигурации открывается для правки
    if config::init_if_not()? {
        let full_config_path = std::env::current_dir()?.join(config::CONFIG_PATH);
        println!(
            "Файл конфигурации инициализирован по пути: {:?}",
            full_config_path
        );
        let _ = open::that_in_background(full_config_path);
    }

    let cfg = config::load(config::CONFIG_PATH)?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&cfg.launch_options.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    if cfg.launch_options.test_mode {
        tracing::info!("тестовый режим ApiShip");
    }

    Ok(cfg)
}

fn client_for(cfg: &Config) -> Result<Client> {
    let client = Client::new(cfg.api_mode())?;
    Ok(match &cfg.launch_options.base_url {
        Some(url) => client.with_base_url(url),
        None => client,
    })
}

fn token_manager(cfg: &Config) -> TokenManager<TomlTokenStore> {
    TokenManager::new(
        TomlTokenStore::default(),
        cfg.credentials.clone(),
        cfg.launch_options.test_mode,
    )
}

fn print_json(value: &impl serde::Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn run(command: Command, mut cfg: Config, store: Arc<dyn CacheStore>) -> Result<()> {
    let client = client_for(&cfg)?;
    let verbose = cfg.launch_options.verbose;

    match command {
        Command::Quote { order_path, session } => {
            let order: Order = serde_json::from_str(&std::fs::read_to_string(order_path)?)?;
            let tokens = token_manager(&cfg);
            let calculator = Calculator::new(cfg, client, tokens, store);
            let outcome = calculator
                .calculate(&order, &RequestContext::backend(&session))
                .await;

            if verbose && let Outcome::Rates(rates) = &outcome {
                for rate in rates {
                    println!(
                        "{}: {} {} ({})",
                        rate.name_string(),
                        rate.rate,
                        rate.currency,
                        rate.est_delivery_string()
                    );
                }
            }
            if let Some(message) = outcome.message() {
                println!("{message}");
            }
            print_json(&outcome)
        }
        Command::Summary { session } => {
            let tokens = token_manager(&cfg);
            let calculator = Calculator::new(cfg, client, tokens, store);
            print_json(&calculator.summary(&session))
        }
        Command::Sync => {
            let tokens = token_manager(&cfg);
            let report = SettingsSync::new(&client, &tokens).sync(&mut cfg).await?;
            if report.token {
                config::save(config::CONFIG_PATH, &cfg)?;
                println!("Настройки обновлены: {:?}", config::CONFIG_PATH);
            }
            print_json(&report)
        }
        Command::Address => {
            let tokens = token_manager(&cfg);
            let calculator = Calculator::new(cfg, client, tokens, store);
            print_json(&serde_json::json!({
                "allowed": calculator.allowed_address(),
                "requested": calculator.requested_fields(None),
            }))
        }
        Command::Tariffs { provider, page } => {
            let tokens = token_manager(&cfg);
            let token = tokens.get_token(&client, false).await;
            let client = client.with_token(token);
            let Some(tariffs) = client.tariffs(&provider, page).await else {
                return Err(Error::Custom(format!(
                    "не удалось получить тарифы провайдера {provider}"
                )));
            };
            println!("Страница {page} из {}", tariffs.pages);
            for tariff in tariffs.items {
                println!("{:>6}  {}", tariff.id, tariff.name);
            }
            Ok(())
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let command = Command::parse(std::env::args().skip(1))?;
    let cfg = startup()?;

    if cfg.launch_options.verbose {
        println!("\x1b[95m{}\x1b[0m\n", LOGO);
    }

    let store: Arc<dyn CacheStore> = Arc::new(FileStore::open(cache::CACHE_PATH));
    let sweeper = cache::spawn_sweeper(store.clone(), SWEEP_INTERVAL);

    let result = tokio::select! {
        result = run(command, cfg, store) => result,
        _ = shutdown_signal() => Ok(()),
    };

    sweeper.abort();
    result
}
