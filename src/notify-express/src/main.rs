//! Notify Express — personalized e-commerce notifications.
//!
//! Command-line entry point. Runs against the in-memory sample shop so every
//! subsystem can be exercised locally.

mod seed;

use anyhow::Context;
use chrono::{DateTime, Duration, Utc};
use clap::{Parser, Subcommand};
use notify_core::config::AppConfig;
use notify_core::memory::{InMemoryExperimentStore, InMemoryInteractionStore};
use notify_core::types::{
    InteractionRecord, NotificationEvent, NotificationType, Segment, UserProfile, Variant,
};
use notify_engine::{LoggingDelivery, NotificationService};
use notify_experimentation::ExperimentManager;
use notify_intelligent_delivery::EngagementMetric;
use notify_reporting::PerformanceAnalyzer;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "notify-express")]
#[command(about = "Personalized e-commerce notification engine")]
#[command(version)]
struct Cli {
    /// Path to a TOML config file
    #[arg(short, long, global = true, env = "NOTIFY_EXPRESS_CONFIG")]
    config: Option<String>,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    json_logs: bool,

    /// Seed for the sample shop history
    #[arg(long, global = true, default_value = "42")]
    seed: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Notify every sample user and print a performance report
    Demo {
        /// Report window in days
        #[arg(long, default_value = "30")]
        days: i64,
    },

    /// Build and print a user profile
    Profile {
        #[arg(short, long)]
        user: String,
    },

    /// Hybrid product recommendations for a user
    Recommend {
        #[arg(short, long)]
        user: String,

        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Best send hour for an engagement metric (opens, clicks, conversions)
    SendTime {
        #[arg(short, long, default_value = "opens")]
        metric: EngagementMetric,
    },

    /// Run a synthetic A/B test and print the analysis
    SimulateExperiment {
        /// Number of simulated users
        #[arg(long, default_value = "1000")]
        users: usize,

        /// Share of users placed in variant A
        #[arg(long)]
        split: Option<f64>,

        /// Click probability for variant A
        #[arg(long, default_value = "0.20")]
        click_rate_a: f64,

        /// Click probability for variant B
        #[arg(long, default_value = "0.35")]
        click_rate_b: f64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "notify_express=info,notify_engine=info".into());
    if cli.json_logs {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    let config = match AppConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            warn!(error = %e, "Failed to load config, using defaults");
            AppConfig::default()
        }
    };

    let now = Utc::now();
    let store = Arc::new(InMemoryInteractionStore::new());
    seed::populate(&store, now, cli.seed);
    info!(
        users = store.user_count(),
        products = store.product_count(),
        "Sample shop loaded"
    );

    let experiments = Arc::new(ExperimentManager::seeded(
        Arc::new(InMemoryExperimentStore::new()),
        store.clone(),
        config.experiment.clone(),
        cli.seed,
    ));
    let delivery = Arc::new(LoggingDelivery::new());
    let service = Arc::new(NotificationService::new(
        config,
        store.clone(),
        experiments.clone(),
        delivery.clone(),
    ));

    match cli.command {
        Commands::Demo { days } => {
            rebuild_models(&service, now).await?;
            run_demo(&service, store, days, now)?;
            info!(sent = delivery.sent_count(), "Demo complete");
        }
        Commands::Profile { user } => {
            let profile = service.profile(&user)?;
            print_json(&profile)?;
        }
        Commands::Recommend { user, limit } => {
            rebuild_models(&service, now).await?;
            print_json(&service.recommend(&user, limit))?;
        }
        Commands::SendTime { metric } => {
            rebuild_models(&service, now).await?;
            let models = service.models();
            print_json(&json!({
                "metric": metric,
                "optimal_hour": service.optimal_send_hour(metric),
                "hourly": models.timing.hourly(),
            }))?;
        }
        Commands::SimulateExperiment {
            users,
            split,
            click_rate_a,
            click_rate_b,
        } => {
            let rates = (click_rate_a, click_rate_b);
            simulate_experiment(&experiments, &store, users, split, rates, cli.seed)?;
        }
    }

    Ok(())
}

/// Model training is CPU bound; keep it off the async workers.
async fn rebuild_models(service: &Arc<NotificationService>, now: DateTime<Utc>) -> anyhow::Result<()> {
    let service = service.clone();
    let models = tokio::task::spawn_blocking(move || service.rebuild_models(now))
        .await
        .context("model rebuild task panicked")??;
    info!(
        version = models.version,
        predictor_trained = models.predictor.is_trained(),
        "Models ready"
    );
    Ok(())
}

fn notification_type_for(profile: &UserProfile) -> NotificationType {
    match profile.segment {
        Segment::NewUser => NotificationType::Welcome,
        Segment::CartAbandoner => NotificationType::CartAbandonment,
        Segment::RepeatBuyer => NotificationType::ReorderSuggestion,
        Segment::ActiveUser if !profile.wishlist_items.is_empty() => {
            NotificationType::WishlistReminder
        }
        Segment::ActiveUser | Segment::VipUser | Segment::InactiveUser => {
            NotificationType::NewProductAlert
        }
    }
}

fn run_demo(
    service: &NotificationService,
    store: Arc<InMemoryInteractionStore>,
    days: i64,
    now: DateTime<Utc>,
) -> anyhow::Result<()> {
    for user_id in seed::USER_IDS {
        let profile = service.profile(user_id)?;
        let notification_type = notification_type_for(&profile);
        let notification = service.generate(user_id, notification_type, None)?;
        let token = format!("device-{user_id}");
        match service.deliver(&notification, &token)? {
            Some(receipt) => info!(user_id, message_id = %receipt.message_id, "Sent"),
            None => info!(user_id, "Skipped"),
        }
        print_json(&notification)?;
    }

    let analyzer = PerformanceAnalyzer::new(store, service.profile_store());
    print_json(&json!({
        "performance": analyzer.performance(days, now)?,
        "trends": analyzer.trends(days, now)?,
        "personalization_effectiveness": analyzer.personalization_effectiveness(days, now)?,
        "optimal_hours": EngagementMetric::ALL
            .iter()
            .map(|m| (m.as_str(), service.optimal_send_hour(*m)))
            .collect::<BTreeMap<_, _>>(),
    }))
}

/// Assign `users` synthetic users, let each click with its variant's
/// probability, and analyze.
fn simulate_experiment(
    experiments: &ExperimentManager,
    store: &InMemoryInteractionStore,
    users: usize,
    split: Option<f64>,
    (click_rate_a, click_rate_b): (f64, f64),
    seed: u64,
) -> anyhow::Result<()> {
    let split = split.unwrap_or_else(|| experiments.default_traffic_split());
    let test_id = experiments.create(
        "cart copy",
        "Plain reminder against urgency wording",
        json!({"title": "Complete your order! 🛍️"}),
        json!({"title": "Your cart expires soon! ⏳"}),
        split,
    )?;
    experiments.start(&test_id)?;

    let mut rng = StdRng::seed_from_u64(seed);
    let sent_at = Utc::now() + Duration::seconds(1);
    for i in 0..users {
        let user_id = format!("sim_{i:05}");
        let variant = experiments.assign_variant(&test_id, &user_id)?;
        let click_rate = match variant {
            Variant::A => click_rate_a,
            Variant::B => click_rate_b,
        };
        let clicked = rng.gen_bool(click_rate.clamp(0.0, 1.0));
        store.record(InteractionRecord::Notification(NotificationEvent {
            user_id,
            notification_type: NotificationType::CartAbandonment,
            sent_at,
            opened_at: clicked.then(|| sent_at + Duration::minutes(5)),
            clicked_at: clicked.then(|| sent_at + Duration::minutes(6)),
            converted_at: None,
            personalization_score: 0.8,
            ab_test_group: Some(variant),
            ab_test_id: Some(test_id),
        }));
    }

    let outcome = experiments.analyze(&test_id)?;
    match outcome.result() {
        Some(result) => print_json(result),
        None => print_json(&outcome),
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
