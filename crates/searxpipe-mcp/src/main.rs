use anyhow::Result;
use clap::{Parser, Subcommand};
use searxpipe_core::{QueryConfig, ScrapeConfig, ScrapeMethod, Settings};
use searxpipe_local::browser::BrowserManager;
use searxpipe_local::scrape::ScrapeOrchestrator;
use searxpipe_local::search::SearchClient;
use std::sync::Arc;

mod encode;

#[derive(Parser, Debug)]
#[command(name = "searxpipe-mcp")]
#[command(about = "SearXNG search + page scraping (MCP stdio server)", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run as an MCP stdio server (for Claude / Cursor / MCP clients).
    McpStdio,
    /// Run one search query and print the TOON result to stdout.
    Search(SearchCmd),
    /// Scrape one URL and print the TOON result to stdout.
    Scrape(ScrapeCmd),
}

#[derive(clap::Args, Debug)]
struct SearchCmd {
    /// The search query.
    #[arg(long)]
    query: String,
    /// Number of results to return (clamped to the configured maximum).
    #[arg(long, default_value_t = 5)]
    num_results: usize,
}

#[derive(clap::Args, Debug)]
struct ScrapeCmd {
    /// The URL to scrape (must be absolute).
    #[arg(long)]
    url: String,
    /// Fetch method. Allowed: requests, browser
    #[arg(long, default_value = "requests")]
    method: String,
    /// Seconds to wait for dynamic content (browser method only; 0-30).
    #[arg(long = "wait", default_value_t = 3)]
    wait_time: u64,
}

mod mcp {
    use super::*;
    use rmcp::{
        handler::server::router::tool::ToolRouter as RmcpToolRouter,
        handler::server::wrapper::Parameters,
        model::{CallToolResult, Content, ServerCapabilities, ServerInfo},
        tool, tool_handler, tool_router,
        transport::stdio,
        ErrorData as McpError, ServiceExt,
    };
    use schemars::JsonSchema;
    use serde::Deserialize;

    fn internal(e: impl std::fmt::Display) -> McpError {
        McpError::internal_error(e.to_string(), None)
    }

    #[derive(Debug, Clone, Copy, Default, Deserialize, JsonSchema)]
    #[serde(rename_all = "lowercase")]
    pub(crate) enum MethodArg {
        /// Plain HTTP fetch; fast, no JavaScript.
        #[default]
        Requests,
        /// Headless browser render for JavaScript-heavy pages.
        Browser,
    }

    impl From<MethodArg> for ScrapeMethod {
        fn from(method: MethodArg) -> Self {
            match method {
                MethodArg::Requests => ScrapeMethod::Requests,
                MethodArg::Browser => ScrapeMethod::Browser,
            }
        }
    }

    #[derive(Debug, Clone, Deserialize, JsonSchema)]
    pub(crate) struct QueryConfigArg {
        /// The search query string.
        pub query: Option<String>,
        /// Number of results to return (1-50; default 5).
        pub num_results: Option<usize>,
    }

    #[derive(Debug, Clone, Default, Deserialize, JsonSchema)]
    pub(crate) struct SearchWebArgs {
        /// One entry per query; results come back keyed by query text.
        #[serde(default)]
        pub query_configs: Vec<QueryConfigArg>,
    }

    #[derive(Debug, Clone, Deserialize, JsonSchema)]
    pub(crate) struct ScrapeConfigArg {
        /// The URL to scrape (must be absolute).
        pub url: Option<String>,
        /// Fetch method (default: requests).
        pub method: Option<MethodArg>,
        /// Seconds to wait for dynamic content (browser method only; 0-30, default 3).
        pub wait_time: Option<u64>,
    }

    #[derive(Debug, Clone, Default, Deserialize, JsonSchema)]
    pub(crate) struct ScrapePagesArgs {
        /// One entry per page; results come back keyed `{index}_{url}_{method}`.
        #[serde(default)]
        pub configs: Vec<ScrapeConfigArg>,
    }

    pub(crate) fn query_configs(args: &SearchWebArgs) -> Vec<QueryConfig> {
        args.query_configs
            .iter()
            .map(|arg| {
                let mut config = QueryConfig::new(arg.query.clone().unwrap_or_default());
                if let Some(n) = arg.num_results {
                    config.num_results = n;
                }
                config
            })
            .collect()
    }

    pub(crate) fn scrape_configs(args: &ScrapePagesArgs) -> Vec<ScrapeConfig> {
        args.configs
            .iter()
            .map(|arg| {
                let mut config = ScrapeConfig::new(arg.url.clone().unwrap_or_default());
                config.method = arg.method.unwrap_or_default().into();
                if let Some(wait) = arg.wait_time {
                    config.wait_time = wait;
                }
                config
            })
            .collect()
    }

    #[derive(Clone)]
    pub(crate) struct SearxpipeMcp {
        tool_router: RmcpToolRouter<Self>,
        search: SearchClient,
        scraper: ScrapeOrchestrator,
        browser: BrowserManager,
    }

    #[tool_router]
    impl SearxpipeMcp {
        pub(crate) fn new(settings: Arc<Settings>) -> Result<Self, McpError> {
            let search = SearchClient::new(settings.clone()).map_err(internal)?;
            let browser = BrowserManager::new(settings.clone());
            let scraper = ScrapeOrchestrator::new(settings, browser.clone()).map_err(internal)?;
            Ok(Self {
                tool_router: Self::tool_router(),
                search,
                scraper,
                browser,
            })
        }

        #[tool(
            description = "Execute one or more web search queries through SearXNG. Returns a TOON-encoded mapping keyed by query text; a failed query yields an error record under its key and never fails the batch."
        )]
        async fn search_web(
            &self,
            params: Parameters<Option<SearchWebArgs>>,
        ) -> Result<CallToolResult, McpError> {
            let args = params.0.unwrap_or_default();
            let configs = query_configs(&args);
            let entries = self.search.search_web(&configs).await;
            Ok(CallToolResult::success(vec![Content::text(
                encode::encode_entries(&entries),
            )]))
        }

        #[tool(
            description = "Scrape one or more web pages and return cleaned text. Use method=requests for static HTML and method=browser for JavaScript-heavy sites. Returns a TOON-encoded mapping keyed {index}_{url}_{method}; a failed page yields an error record under its key."
        )]
        async fn scrape_pages(
            &self,
            params: Parameters<Option<ScrapePagesArgs>>,
        ) -> Result<CallToolResult, McpError> {
            let args = params.0.unwrap_or_default();
            let configs = scrape_configs(&args);
            let entries = self.scraper.scrape_pages(&configs).await;
            Ok(CallToolResult::success(vec![Content::text(
                encode::encode_entries(&entries),
            )]))
        }
    }

    #[tool_handler]
    impl rmcp::ServerHandler for SearxpipeMcp {
        fn get_info(&self) -> ServerInfo {
            ServerInfo {
                instructions: Some(
                    "Web search via a SearXNG instance plus page scraping (plain HTTP or headless browser). Responses are TOON-encoded for token efficiency."
                        .to_string(),
                ),
                capabilities: ServerCapabilities::builder().enable_tools().build(),
                ..Default::default()
            }
        }
    }

    pub(crate) async fn serve_stdio(settings: Arc<Settings>) -> Result<(), McpError> {
        let svc = SearxpipeMcp::new(settings)?;
        let browser = svc.browser.clone();
        let running = svc.serve(stdio()).await.map_err(internal)?;
        // Keep the stdio server alive until the client closes.
        let served = running.waiting().await;
        // The browser instance outlives individual calls; close it on the way
        // out so no orphan Chromium is left behind.
        browser.shutdown().await;
        served.map_err(internal)?;
        Ok(())
    }

}

fn parse_method(raw: &str) -> Result<ScrapeMethod> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "requests" => Ok(ScrapeMethod::Requests),
        "browser" => Ok(ScrapeMethod::Browser),
        other => anyhow::bail!("unknown method {other:?} (allowed: requests, browser)"),
    }
}

async fn run_search(settings: Arc<Settings>, cmd: SearchCmd) -> Result<()> {
    let client = SearchClient::new(settings)?;
    let mut config = QueryConfig::new(cmd.query);
    config.num_results = cmd.num_results;
    let entries = client.search_web(&[config]).await;
    println!("{}", encode::encode_entries(&entries));
    Ok(())
}

async fn run_scrape(settings: Arc<Settings>, cmd: ScrapeCmd) -> Result<()> {
    let mut config = ScrapeConfig::new(cmd.url);
    config.method = parse_method(&cmd.method)?;
    config.wait_time = cmd.wait_time;

    let browser = BrowserManager::new(settings.clone());
    let orchestrator = ScrapeOrchestrator::new(settings, browser.clone())?;
    let entries = orchestrator.scrape_pages(&[config]).await;
    browser.shutdown().await;
    println!("{}", encode::encode_entries(&entries));
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // stdout carries MCP framing and TOON payloads; diagnostics go to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let settings = Arc::new(Settings::from_env()?);

    match cli.command {
        Commands::McpStdio => {
            mcp::serve_stdio(settings)
                .await
                .map_err(|e| anyhow::anyhow!(e.to_string()))?;
        }
        Commands::Search(cmd) => run_search(settings, cmd).await?,
        Commands::Scrape(cmd) => run_scrape(settings, cmd).await?,
    }
    Ok(())
}
