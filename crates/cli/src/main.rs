use std::io::{self, Write};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use waypoint_agents::{AgentSettings, Collaborators, TravelAgent};
use waypoint_core::{Coordinates, DispatchOutcome, PromptInput, RouteSide};
use waypoint_observability::{init_tracing, AppMetrics};
use waypoint_providers::{
    HttpProviders, ProviderConfig, DEFAULT_GEMINI_BASE_URL, DEFAULT_GEMINI_MODEL,
    DEFAULT_GEOCODING_BASE_URL, DEFAULT_IP_LOCATION_BASE_URL, DEFAULT_WEATHER_BASE_URL,
};

#[derive(Debug, Parser)]
#[command(name = "waypoint")]
#[command(about = "Waypoint travel assistant CLI")]
struct Cli {
    #[command(flatten)]
    providers: ProviderArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Args)]
struct ProviderArgs {
    #[arg(long, env = "GOOGLE_API_KEY", hide_env_values = true)]
    google_api_key: String,

    #[arg(long, env = "RAPIDAPI_KEY", hide_env_values = true)]
    rapidapi_key: String,

    #[arg(long, env = "WAYPOINT_GEMINI_MODEL", default_value = DEFAULT_GEMINI_MODEL)]
    model: String,

    #[arg(long, env = "WAYPOINT_GEMINI_BASE_URL", default_value = DEFAULT_GEMINI_BASE_URL)]
    gemini_base_url: String,

    #[arg(long, env = "WAYPOINT_GEOCODING_BASE_URL", default_value = DEFAULT_GEOCODING_BASE_URL)]
    geocoding_base_url: String,

    #[arg(long, env = "WAYPOINT_WEATHER_BASE_URL", default_value = DEFAULT_WEATHER_BASE_URL)]
    weather_base_url: String,

    #[arg(long, env = "WAYPOINT_IP_LOCATION_BASE_URL", default_value = DEFAULT_IP_LOCATION_BASE_URL)]
    ip_location_base_url: String,

    #[arg(long, env = "WAYPOINT_HTTP_TIMEOUT_SECONDS", default_value_t = 20)]
    timeout_seconds: u64,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Classify and resolve a single prompt.
    Ask {
        text: String,
        #[arg(long, allow_negative_numbers = true)]
        lat: Option<f64>,
        #[arg(long, allow_negative_numbers = true)]
        lon: Option<f64>,
        #[arg(long)]
        session: Option<String>,
    },
    Chat,
}

#[derive(Debug, Serialize)]
struct AskOutput<'a> {
    result: &'a DispatchOutcome,
    unresolved: Vec<RouteSide>,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing("waypoint_cli");
    let cli = Cli::parse();

    let agent = build_agent(&cli.providers)?;

    match cli.command {
        Command::Ask {
            text,
            lat,
            lon,
            session,
        } => {
            let caller = caller_coordinates(lat, lon)?;
            let outcome = agent
                .handle_prompt(PromptInput {
                    session_id: session,
                    text,
                    caller,
                })
                .await;
            print_outcome(&outcome)?;
        }
        Command::Chat => run_chat(agent).await?,
    }

    Ok(())
}

async fn run_chat(agent: TravelAgent) -> Result<()> {
    let session_id = format!("cli-{}", uuid::Uuid::new_v4());

    println!("Waypoint chat mode. ':reset' starts over, 'exit' quits.");

    loop {
        print!("> ");
        io::stdout().flush()?;

        let mut line = String::new();
        if io::stdin().read_line(&mut line)? == 0 {
            break;
        }

        let message = line.trim();
        if message.eq_ignore_ascii_case("exit") || message.eq_ignore_ascii_case("quit") {
            break;
        }
        if message.is_empty() {
            continue;
        }

        if message == ":reset" {
            match agent.reset_conversation(Some(&session_id)).await {
                Ok(ack) => println!("\nConversation reset. {ack}\n"),
                Err(err) => eprintln!("\nreset failed: {err:#}\n"),
            }
            continue;
        }

        let outcome = agent
            .handle_prompt(PromptInput {
                session_id: Some(session_id.clone()),
                text: message.to_string(),
                caller: None,
            })
            .await;
        println!();
        print_outcome(&outcome)?;
        println!();
    }

    Ok(())
}

fn print_outcome(outcome: &DispatchOutcome) -> Result<()> {
    let output = AskOutput {
        result: outcome,
        unresolved: outcome.payload.unresolved_sides(),
    };
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn caller_coordinates(lat: Option<f64>, lon: Option<f64>) -> Result<Option<Coordinates>> {
    match (lat, lon) {
        (None, None) => Ok(None),
        (Some(lat), Some(lon)) => {
            let at = Coordinates::new(lat, lon);
            if !at.is_valid() {
                bail!("--lat/--lon out of range: {lat}, {lon}");
            }
            Ok(Some(at))
        }
        _ => bail!("--lat and --lon must be given together"),
    }
}

fn build_agent(args: &ProviderArgs) -> Result<TravelAgent> {
    let mut config = ProviderConfig::new(&args.google_api_key, &args.rapidapi_key);
    config.gemini_model = args.model.clone();
    config.gemini_base_url = args.gemini_base_url.trim_end_matches('/').to_string();
    config.geocoding_base_url = args.geocoding_base_url.trim_end_matches('/').to_string();
    config.weather_base_url = args.weather_base_url.trim_end_matches('/').to_string();
    config.ip_location_base_url = args.ip_location_base_url.trim_end_matches('/').to_string();
    config.request_timeout = Duration::from_secs(args.timeout_seconds.max(1));

    let providers = HttpProviders::from_config(&config).context("failed to build providers")?;
    Ok(TravelAgent::new(
        Collaborators {
            chat_model: providers.chat_model,
            geocoder: providers.geocoder,
            weather: providers.weather,
            current_location: providers.current_location,
        },
        AgentSettings::default(),
        AppMetrics::shared(),
    ))
}
