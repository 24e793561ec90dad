use anyhow::Result;
use clap::{Parser, Subcommand};
use facesign_client::{Config, Coordinator, Gateway, RecognitionBackend, SessionView};
use facesign_core::{SessionState, Transport, DETECTION_THRESHOLD};

#[derive(Parser)]
#[command(name = "facesign", about = "Face sign-in client for the recognition service")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a recognition attempt to completion (Ctrl-C cancels)
    SignIn {
        /// Status transport: "polling" or "events"
        #[arg(short, long, default_value = "polling")]
        transport: String,
    },
    /// Enroll a face under the given name
    Enroll {
        /// Name to train the face under
        name: String,
    },
    /// Show the current recognition status
    Status,
    /// Reset the server-side recognition state
    Reset,
    /// Print the live video feed URL
    VideoUrl,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = Config::from_env();
    let gateway = Gateway::new(&config.base_url, config.http_timeout)?;

    match cli.command {
        Commands::SignIn { transport } => {
            let transport: Transport = transport.parse()?;
            let mut coordinator = Coordinator::new(gateway, config);

            let cancel = coordinator.cancel_handle();
            tokio::spawn(async move {
                let _ = tokio::signal::ctrl_c().await;
                cancel.cancel();
            });

            let mut view_rx = coordinator.subscribe();
            let printer = tokio::spawn(async move {
                while view_rx.changed().await.is_ok() {
                    let view = view_rx.borrow_and_update().clone();
                    render_progress(&view);
                }
            });

            let outcome = coordinator.run_attempt(transport, None).await;
            printer.abort();

            match outcome {
                SessionState::Succeeded { user } => println!("Welcome {user}!"),
                SessionState::Failed => {
                    println!("Recognition failed. Please try again.");
                    std::process::exit(1);
                }
                SessionState::Cancelled => println!("Sign-in cancelled."),
                other => println!("Attempt ended in state {other:?}"),
            }
        }
        Commands::Enroll { name } => {
            let mut coordinator = Coordinator::new(gateway, config);
            match coordinator.enroll(&name).await {
                Ok(ack) if ack.success => println!("{}", ack.message),
                Ok(ack) => {
                    eprintln!("Training failed: {}", ack.message);
                    std::process::exit(1);
                }
                Err(err) => {
                    eprintln!("{err}");
                    std::process::exit(1);
                }
            }
        }
        Commands::Status => {
            let status = gateway.status().await;
            println!("{}", serde_json::to_string_pretty(&status)?);
        }
        Commands::Reset => {
            let ack = gateway.reset().await;
            println!("{}", ack.message);
        }
        Commands::VideoUrl => {
            println!("{}", gateway.video_feed_url());
        }
    }

    Ok(())
}

/// Progress lines mirroring the recognition server's own phrasing.
fn render_progress(view: &SessionView) {
    match &view.state {
        SessionState::Starting => println!("Starting recognition..."),
        SessionState::Active => match &view.latest {
            None => println!("Initializing recognition..."),
            Some(status) if status.detection_count > 0 => println!(
                "Analyzing... {}/{} detections",
                status.detection_count, DETECTION_THRESHOLD
            ),
            Some(_) => println!("Waiting for face detection..."),
        },
        // Terminal outcomes are reported once by the main flow.
        _ => {}
    }
}
