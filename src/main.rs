use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use sea_orm::sea_query::SqliteQueryBuilder;
use sea_orm::DatabaseBackend;
use serde::Deserialize;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// Use the library instead of redeclaring modules
use adapted_repo::{
    config::Config,
    data_source::sql::SqlTranslator,
    expression::{fuse, Expr, IncludeFactory, Projection},
    model::Entity,
    repositories::{
        AdaptedRepository, DataSourceRepository, Repository, RepositorySettings, UnitOfWork,
    },
    sample::{self, Customer, Employee, Order, OrderDto},
    specification::Specification,
};

#[derive(Parser)]
#[command(name = "adapted-repo")]
#[command(version)]
#[command(about = "Repository and unit-of-work layer over rewritable expression trees")]
#[command(long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE")]
    config: Option<String>,

    /// Log level (overrides config file)
    #[arg(short = 'v', long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run sample queries against the in-memory Northwind data
    Demo {
        #[arg(long, default_value = "USA")]
        country: String,
    },
    /// Show a predicate, its DTO rewrite, a fused projection and the SQL
    Explain {
        #[arg(long, default_value = "USA")]
        country: String,
    },
    /// Print the effective configuration
    Config,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct OrderSummary {
    order_id: i64,
    company: Option<String>,
    salesperson: Option<String>,
}

fn order_summary() -> Projection<Order, OrderSummary> {
    Projection::new(|x| {
        Expr::construct(
            "OrderSummary",
            [
                ("OrderId", x.clone().field::<Order>("OrderId")),
                (
                    "Company",
                    x.clone()
                        .field::<Order>("Customer")
                        .field::<Customer>("CompanyName"),
                ),
                (
                    "Salesperson",
                    x.field::<Order>("Employee").field::<Employee>("LastName"),
                ),
            ],
        )
    })
}

fn customer_and_employee() -> IncludeFactory<Order> {
    IncludeFactory::new(|x| {
        Expr::construct(
            "Includes",
            [
                ("Customer", x.clone().field::<Order>("Customer")),
                ("Employee", x.field::<Order>("Employee")),
            ],
        )
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::load_from_file(path)?,
        None => Config::load()?,
    };

    let level = cli
        .log_level
        .clone()
        .unwrap_or_else(|| config.logging.level.clone());
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("adapted_repo={level}").into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("adapted-repo v{}", env!("CARGO_PKG_VERSION"));
    if let Some(path) = &cli.config {
        info!("Configuration loaded from: {}", path);
    }

    match cli.command {
        Command::Demo { country } => demo(&config, &country).await,
        Command::Explain { country } => explain(&country),
        Command::Config => {
            print!("{}", config.to_toml()?);
            Ok(())
        }
    }
}

async fn demo(config: &Config, country: &str) -> Result<()> {
    let source = Arc::new(sample::memory_source()?);
    let settings = RepositorySettings::from(&config.repository);
    let orders = DataSourceRepository::<Order, _>::new(source.clone(), settings.clone());

    let spec = Specification::from(sample::ships_to(country))
        | Specification::from(sample::freight_at_least(50.0));
    println!("Orders where {spec}:");
    for order in orders.find_by(&spec).await? {
        println!(
            "  {} -> {} (freight {:.2})",
            order.order_id, order.ship_country, order.freight
        );
    }

    let local = sample::customer_in(country);
    println!(
        "Orders placed by customers in {country}: {} (any: {})",
        orders.count_by(&local).await?,
        orders.any_by(&local).await?
    );

    println!("Summaries (projection with includes):");
    let summaries = orders
        .find_by_projected(
            &sample::ships_to(country),
            &order_summary(),
            Some(&customer_and_employee()),
        )
        .await?;
    for summary in summaries {
        println!(
            "  {} {} / {}",
            summary.order_id,
            summary.company.as_deref().unwrap_or("-"),
            summary.salesperson.as_deref().unwrap_or("-")
        );
    }

    let adapted = AdaptedRepository::<Order, OrderDto, _>::new(
        source.clone(),
        sample::dto_mapping()?,
        settings,
    )?;
    let via_dto = adapted.find_by(&sample::ships_to(country)).await?;
    println!(
        "Same query through the DTO repository: {:?}",
        via_dto.iter().map(|o| o.order_id).collect::<Vec<_>>()
    );

    let mut order = sample::orders().remove(0);
    order.order_id = 11077;
    order.ship_country = country.to_string();
    orders.add(order).await?;
    let before = orders.count_by(&sample::ships_to(country)).await?;
    orders.commit().await?;
    let after = orders.count_by(&sample::ships_to(country)).await?;
    println!("Unit of work: {before} order(s) before commit, {after} after");

    Ok(())
}

fn explain(country: &str) -> Result<()> {
    let spec = Specification::from(sample::ships_to(country))
        & Specification::from(sample::freight_at_least(10.0));
    println!("predicate:  {spec}");

    let mapping = sample::dto_mapping()?;
    let rewritten = spec.predicate().rewrite::<OrderDto>(&mapping)?;
    println!("rewritten:  {rewritten}");

    let fused = fuse(
        order_summary().lambda(),
        customer_and_employee().lambda(),
    )?;
    println!("fused:      {}", fused.lambda());
    println!(
        "includes:   [{}]",
        fused
            .include_paths()
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ")
    );

    let descriptor = Order::descriptor();
    let translator = SqlTranslator::new(&descriptor, DatabaseBackend::Sqlite);
    let select = translator.select(spec.predicate().lambda())?;
    println!("sql:        {}", select.to_string(SqliteQueryBuilder));
    let count = translator.count(spec.predicate().lambda())?;
    println!("count sql:  {}", count.to_string(SqliteQueryBuilder));
    Ok(())
}
