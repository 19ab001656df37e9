use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::{Address, U256};
use clap::{ArgGroup, Args, Parser, Subcommand};
use eyre::{eyre, Result};
use log::info;
use serde_json::json;

use swap_quoter::config::Config;
use swap_quoter::gas::{GasPricePoller, ProviderGasPriceSource};
use swap_quoter::market::assembler::{GetMarketOrdersOpts, MarketOperations};
use swap_quoter::market::{Side, Source};
use swap_quoter::optimizer::fees::ExchangeProxyOverhead;
use swap_quoter::rfq::offerings::{AltMarketsClient, OfferingsCache};
use swap_quoter::rfq::policy::should_enable_rfqt;
use swap_quoter::rfq::types::AltRfqMakerAssetOfferings;
use swap_quoter::rfq::{RfqClient, RfqPolicy, RfqRequestOpts};
use swap_quoter::sampler::sources::mainnet_curve_pools;
use swap_quoter::sampler::{AlloySamplerContract, DexOrderSampler, SamplerOperations};
use swap_quoter::token_graph::default_token_adjacency_graph;
use swap_quoter::utils::constants::{
    contract_addresses, DAI, DEFAULT_BRIDGE_SLIPPAGE, DEFAULT_INTERMEDIATE_TOKENS, MAINNET_CHAIN_ID, USDC, USDT,
    VIP_SOURCES,
};
use swap_quoter::utils::logger::setup_logger;
use swap_quoter::utils::providers::create_http_provider;
use swap_quoter::{SwapQuoteRequestOpts, SwapQuoter};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Quote a swap and print it as JSON
    Quote(QuoteArgs),
    /// Print the current gas price
    GasPrice,
}

#[derive(Args)]
#[command(group(ArgGroup::new("amount").required(true).args(["sell_amount", "buy_amount"])))]
struct QuoteArgs {
    /// Token sold
    #[arg(long)]
    sell_token: Address,
    /// Token bought
    #[arg(long)]
    buy_token: Address,
    /// Amount of the sell token to sell, in base units
    #[arg(long)]
    sell_amount: Option<U256>,
    /// Amount of the buy token to buy, in base units
    #[arg(long)]
    buy_amount: Option<U256>,
    /// Slippage of bridge fills in the worst case
    #[arg(long, default_value_t = DEFAULT_BRIDGE_SLIPPAGE)]
    slippage: f64,
    /// Sources not to route through
    #[arg(long, value_parser = parse_source, num_args = 1..)]
    exclude: Vec<Source>,
    /// Gas price in wei, the node's price otherwise
    #[arg(long)]
    gas_price: Option<U256>,
    /// Integrator asking; enables RFQ when whitelisted
    #[arg(long)]
    integrator_id: Option<String>,
    /// Transaction origin firm quotes are bound to
    #[arg(long)]
    tx_origin: Option<Address>,
    /// Address that will fill the quote
    #[arg(long)]
    taker_address: Option<Address>,
    /// Ask market makers for firm quotes instead of prices
    #[arg(long)]
    firm: bool,
}

/// Parses a source name, case-insensitively.
fn parse_source(name: &str) -> Result<Source, String> {
    Source::ALL
        .into_iter()
        .find(|s| s.to_string().eq_ignore_ascii_case(name))
        .ok_or_else(|| format!("unknown source {name}"))
}

/// Long-lived services built from the configuration.
struct Services {
    quoter: SwapQuoter,
    gas_prices: Arc<GasPricePoller>,
    offerings: Option<OfferingsCache<AltMarketsClient>>,
    ether_token: Address,
    rfq_max_response_time_ms: u64,
}

fn build_services(config: &Config) -> Result<Services> {
    let provider = create_http_provider(config);
    let mut addresses = contract_addresses(config.chain_id)
        .or_else(|| contract_addresses(MAINNET_CHAIN_ID))
        .cloned()
        .ok_or_else(|| eyre!("no contract addresses known"))?;
    addresses.sampler = config.sampler_address;
    let ether_token = addresses.ether_token;

    let graph = default_token_adjacency_graph(&DEFAULT_INTERMEDIATE_TOKENS, &[USDC, USDT, DAI])?;
    let curve_pools = if config.chain_id == MAINNET_CHAIN_ID {
        mainnet_curve_pools()
    } else {
        Vec::new()
    };
    let ops = SamplerOperations::new(addresses.clone(), Arc::new(graph), curve_pools, Vec::new());
    let contract = AlloySamplerContract::new(config.sampler_address, provider.clone());
    let mut market_operations =
        MarketOperations::new(DexOrderSampler::new(Arc::new(contract), ops), config.chain_id, addresses);
    if let Some(url) = &config.rfq_api_url {
        let client = RfqClient::new(url, config.rfq_max_response_time_ms)?;
        market_operations = market_operations.with_rfq_transport(Arc::new(client));
    }

    let gas_prices = Arc::new(GasPricePoller::spawn(
        Arc::new(ProviderGasPriceSource::new(provider)),
        config.gas_price_poll_interval,
        config.gas_price_max_retries,
    ));
    let policy = RfqPolicy::new(
        config.rfq_integrator_whitelist.iter().cloned(),
        config.tx_origin_blacklist.iter().copied(),
    );
    let offerings = match &config.alt_rfq_offerings_url {
        Some(url) => Some(OfferingsCache::new(
            AltMarketsClient::new(
                url,
                &config.alt_rfq_api_key,
                Duration::from_millis(config.rfq_max_response_time_ms),
            )?,
            config.alt_rfq_refresh_interval,
        )),
        None => None,
    };

    Ok(Services {
        quoter: SwapQuoter::new(market_operations, Arc::clone(&gas_prices), policy),
        gas_prices,
        offerings,
        ether_token,
        rfq_max_response_time_ms: config.rfq_max_response_time_ms,
    })
}

/// Whether the request asks market makers for liquidity.
fn wants_rfqt(args: &QuoteArgs, side: Side, ether_token: Address) -> bool {
    let is_eth_sell = side == Side::Sell && args.sell_token == ether_token;
    should_enable_rfqt(
        args.integrator_id.is_some(),
        is_eth_sell,
        args.taker_address.is_some(),
        !args.firm,
    )
}

async fn quote(services: &Services, args: QuoteArgs) -> Result<()> {
    let (side, amount) = match (args.sell_amount, args.buy_amount) {
        (Some(amount), _) => (Side::Sell, amount),
        (None, Some(amount)) => (Side::Buy, amount),
        (None, None) => return Err(eyre!("either --sell-amount or --buy-amount is required")),
    };
    let rfq_wanted = wants_rfqt(&args, side, services.ether_token);
    let QuoteArgs {
        sell_token,
        buy_token,
        slippage,
        exclude,
        gas_price,
        integrator_id,
        tx_origin,
        taker_address,
        firm,
        ..
    } = args;

    let rfqt = if rfq_wanted {
        let alt_rfq_asset_offerings = match &services.offerings {
            Some(cache) => cache.get().await,
            None => AltRfqMakerAssetOfferings::default(),
        };
        Some(RfqRequestOpts {
            integrator_id,
            tx_origin,
            taker_address: taker_address.unwrap_or(Address::ZERO),
            intent_on_filling: firm,
            is_indicative: !firm,
            native_exclusively_rfq: false,
            maker_endpoint_max_response_time_ms: services.rfq_max_response_time_ms,
            alt_rfq_asset_offerings,
        })
    } else {
        None
    };

    let opts = SwapQuoteRequestOpts {
        gas_price,
        market: GetMarketOrdersOpts {
            bridge_slippage: slippage,
            excluded_sources: exclude,
            rfqt,
            exchange_proxy_overhead: ExchangeProxyOverhead::with_vip_sources(&VIP_SOURCES),
            ..GetMarketOrdersOpts::default()
        },
    };
    let quote = services
        .quoter
        .get_swap_quote(buy_token, sell_token, amount, side, Vec::new(), &opts)
        .await?;
    println!("{}", serde_json::to_string_pretty(&quote)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    setup_logger()?;

    let cli = Cli::parse();
    let config = Config::from_env()?;
    info!("Quoter started on chain {} with RPC {}", config.chain_id, config.rpc_url);
    let services = build_services(&config)?;

    match cli.command {
        Commands::Quote(args) => quote(&services, args).await?,
        Commands::GasPrice => {
            let gas_price = services.gas_prices.gas_price().await?;
            println!("{}", json!({ "gasPrice": gas_price.to_string() }));
        }
    }

    Ok(())
}
