mod api;
mod cache;
mod config;
mod connectivity;

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use tracing_subscriber::EnvFilter;

use api::cached_client::CachedClient;
use api::error::ApiError;
use api::types::ApplicationStage;
use cache::{Bucket, CacheResult, CacheStore, MutationOutcome};
use connectivity::{AssumeOnline, ConnectivityProbe, ManualProbe};

#[derive(Parser, Debug)]
#[command(name = "stint")]
#[command(about = "Offline-first client for the internship tracking platform")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/stint/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Act as if the network is unreachable
  #[arg(long)]
  offline: bool,

  /// Disable the local cache and offline queue
  #[arg(long)]
  no_cache: bool,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// List students
  Students,
  /// Show a single student
  Student { id: String },
  /// List applications, optionally filtered by stage
  Applications {
    #[arg(long)]
    stage: Option<ApplicationStage>,
  },
  /// List mentor feedback for an application
  Feedback { application_id: String },
  /// Show the signed-in user's profile
  Profile,
  /// Submit mentor feedback on an application
  SubmitFeedback {
    application_id: String,
    #[arg(long)]
    rating: u8,
    #[arg(long)]
    comment: String,
  },
  /// Log a new application
  Apply {
    #[arg(long)]
    company: String,
    #[arg(long)]
    role: String,
  },
  /// Move an application to a new stage
  SetStage {
    application_id: String,
    stage: ApplicationStage,
  },
  /// Update the signed-in user's profile
  UpdateProfile {
    #[arg(long)]
    name: Option<String>,
    #[arg(long)]
    bio: Option<String>,
  },
  /// Replay mutations queued while offline
  Sync,
  /// Show mutations waiting for replay
  Queue,
  /// Clear cached data
  CacheClear {
    /// Bucket to clear; all buckets when omitted
    bucket: Option<String>,
  },
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::try_from_env("STINT_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("warn")),
    )
    .with_writer(std::io::stderr)
    .init();

  let args = Args::parse();
  let config = config::Config::load(args.config.as_deref())?;

  let probe: Arc<dyn ConnectivityProbe> = if args.offline {
    Arc::new(ManualProbe::new(false))
  } else {
    Arc::new(AssumeOnline)
  };

  if args.no_cache {
    let client = CachedClient::without_cache(&config, probe)?;
    run(client, args.command).await
  } else {
    let client = CachedClient::open(&config, probe)?;
    run(client, args.command).await
  }
}

async fn run<S: CacheStore>(client: CachedClient<S>, command: Command) -> Result<()> {
  match command {
    Command::Students => {
      let result = client.students().await.map_err(user_error)?;
      for student in &result.data {
        println!(
          "{}  {}  {}  {}",
          student.id,
          student.name,
          student.status,
          student.university.as_deref().unwrap_or("-")
        );
      }
      print_provenance(&result);
    }
    Command::Student { id } => {
      let result = client.student(&id).await.map_err(user_error)?;
      let s = &result.data;
      println!("{}  {}  {}  {}", s.id, s.name, s.email, s.status);
      print_provenance(&result);
    }
    Command::Applications { stage } => {
      let result = client.applications(stage).await.map_err(user_error)?;
      for app in &result.data {
        println!("{}  {}  {}  {}", app.id, app.company, app.role, app.stage);
      }
      print_provenance(&result);
    }
    Command::Feedback { application_id } => {
      let result = client.feedback_for(&application_id).await.map_err(user_error)?;
      for fb in &result.data {
        println!("{}  {}/5  {}", fb.mentor_id, fb.rating, fb.comment);
      }
      print_provenance(&result);
    }
    Command::Profile => {
      let result = client.profile().await.map_err(user_error)?;
      let p = &result.data;
      println!("{}  {}  {} ({})", p.id, p.name, p.email, p.role);
      if let Some(bio) = &p.bio {
        println!("{}", bio);
      }
      print_provenance(&result);
    }
    Command::SubmitFeedback {
      application_id,
      rating,
      comment,
    } => {
      let outcome = client
        .submit_feedback(&application_id, rating, &comment)
        .await
        .map_err(user_error)?;
      match outcome {
        MutationOutcome::Completed(fb) => println!("Feedback {} submitted", fb.id),
        MutationOutcome::Queued { .. } => {
          println!("Saved locally; will sync when the network is back")
        }
      }
    }
    Command::Apply { company, role } => {
      let outcome = client
        .create_application(&company, &role)
        .await
        .map_err(user_error)?;
      match outcome {
        MutationOutcome::Completed(app) => println!("Application {} created", app.id),
        MutationOutcome::Queued { .. } => {
          println!("Saved locally; will sync when the network is back")
        }
      }
    }
    Command::SetStage {
      application_id,
      stage,
    } => {
      let outcome = client
        .update_application_stage(&application_id, stage)
        .await
        .map_err(user_error)?;
      match outcome {
        MutationOutcome::Completed(app) => {
          println!("Application {} is now {}", app.id, app.stage)
        }
        MutationOutcome::Queued { .. } => {
          println!("Saved locally; will sync when the network is back")
        }
      }
    }
    Command::UpdateProfile { name, bio } => {
      let outcome = client.update_profile(name, bio).await.map_err(user_error)?;
      match outcome {
        MutationOutcome::Completed(p) => println!("Profile {} updated", p.id),
        MutationOutcome::Queued { .. } => {
          println!("Saved locally; will sync when the network is back")
        }
      }
    }
    Command::Sync => {
      let summary = client.process_offline_queue().await;
      println!(
        "Replayed {} action(s), {} still queued",
        summary.replayed, summary.remaining
      );
    }
    Command::Queue => {
      let queued = client.queued_actions();
      if queued.is_empty() {
        println!("Nothing queued");
      }
      for (action, queued_at) in queued {
        println!("{}  (queued {})", action.describe(), queued_at.to_rfc3339());
      }
    }
    Command::CacheClear { bucket } => match bucket {
      Some(name) => {
        let bucket =
          Bucket::parse(&name).ok_or_else(|| eyre!("Unknown bucket: {}", name))?;
        client.clear_cache(bucket);
        println!("Cleared {}", bucket);
      }
      None => {
        for bucket in Bucket::ALL {
          client.clear_cache(bucket);
        }
        println!("Cleared all buckets");
      }
    },
  }

  Ok(())
}

fn print_provenance<T>(result: &CacheResult<T>) {
  if result.is_offline() {
    match result.cached_at {
      Some(ts) => eprintln!("(offline: showing data cached {})", ts.to_rfc3339()),
      None => eprintln!("(offline: showing cached data)"),
    }
  } else if result.is_from_cache() {
    eprintln!("(cached)");
  }
}

fn user_error(err: ApiError) -> color_eyre::Report {
  eyre!(err.user_message())
}
