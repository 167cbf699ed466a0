use clap::Parser;
use tracing::info;
use wanderlore::entity::humanize_slug;
use wanderlore::report::render_markdown;
use wanderlore::{EntityInput, ResearchRequest, Researcher};

#[derive(Parser)]
#[command(name = "wanderlore")]
#[command(about = "Research a location from trusted free sources and summarize it")]
struct Args {
    /// Location slug, e.g. "kyoto" or "new-york-city"
    #[arg(short, long)]
    slug: Option<String>,

    /// Display name of the place
    #[arg(short, long)]
    name: Option<String>,

    /// Latitude in degrees
    #[arg(long, allow_negative_numbers = true, requires = "lon")]
    lat: Option<f64>,

    /// Longitude in degrees
    #[arg(long, allow_negative_numbers = true, requires = "lat")]
    lon: Option<f64>,

    /// ISO 3166-1 alpha-2 country code
    #[arg(short, long)]
    country: Option<String>,

    /// Free-text focus, part of the cache identity
    #[arg(short, long)]
    query: Option<String>,

    /// Maximum number of citations
    #[arg(short, long)]
    limit: Option<usize>,

    /// Preferred language, e.g. "ja" or "pt-BR"
    #[arg(long)]
    lang: Option<String>,

    /// Print the result as JSON instead of Markdown
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("wanderlore=info".parse()?),
        )
        .init();

    let args = Args::parse();
    let title = args
        .name
        .clone()
        .or_else(|| args.slug.as_deref().map(humanize_slug))
        .unwrap_or_else(|| "Unknown".to_string());

    let request = ResearchRequest {
        input: EntityInput {
            slug: args.slug,
            name: args.name,
            lat: args.lat,
            lon: args.lon,
            country_code: args.country,
        },
        query: args.query,
        limit: args.limit,
        lang: args.lang,
        ..Default::default()
    };

    let researcher = Researcher::from_env()?;
    let result = researcher.research_for_location(request).await;
    info!(citations = result.citations.len(), "done");

    if args.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print!("{}", render_markdown(&title, &result));
    }
    Ok(())
}
