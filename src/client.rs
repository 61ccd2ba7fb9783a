use crate::{
    deployment::{
        DeploymentEnv,
        DeploymentStore,
    },
    events,
    format,
    resolver::{
        self,
        CancelHandle,
        GameReader,
        PollConfig,
        Resolution,
    },
    rps_types::{
        Game,
        RockPaperScissors,
    },
    stats::{
        self,
        PlayerStatistics,
        signed_delta,
    },
    types::{
        Choice,
        GameOutcome,
        GameRecord,
        ResolutionOutcome,
        narrow_u64,
        narrow_u128,
    },
    ui,
    wallets,
};
use color_eyre::eyre::{
    Result,
    WrapErr,
    eyre,
};
use ethers::{
    middleware::SignerMiddleware,
    providers::{
        Http,
        Middleware,
        Provider,
    },
    signers::{
        LocalWallet,
        Signer,
    },
    types::{
        Address,
        TransactionReceipt,
        U256,
    },
};
use futures::future::join_all;
use rand::Rng;
use std::{
    cmp::Ordering,
    path::PathBuf,
    sync::Arc,
    time::Duration,
};
use tokio::{
    sync::mpsc,
    time,
};
use tracing::{
    debug,
    error,
    warn,
};

pub const DEFAULT_MAINNET_RPC_URL: &str = "https://mainnet.base.org";
pub const DEFAULT_TESTNET_RPC_URL: &str = "https://sepolia.base.org";
pub const DEFAULT_LOCAL_RPC_URL: &str = "http://localhost:8545";

const GAME_HISTORY_DEPTH: usize = 10;
const MAX_TRACKED_ERRORS: usize = 50;
const REFRESH_INTERVAL: Duration = Duration::from_secs(5);
/// Short pause before showing a polled reveal so the banner does not pop in
/// mid-keystroke.
const REVEAL_DISPLAY_DELAY: Duration = Duration::from_millis(400);

pub type AppMiddleware = SignerMiddleware<Provider<Http>, LocalWallet>;
pub type GameContract = RockPaperScissors<AppMiddleware>;

/// The `getGame` binding decodes into the ABI tuple; repackage it into the
/// named `Game` struct the decoding layer expects. Field order mirrors the
/// `Game` struct in the contract ABI.
type GameTuple = (Address, U256, u8, u8, u8, u64, [u8; 32], U256, U256, bool);

fn game_tuple_to_struct(raw: GameTuple) -> Game {
    Game {
        player: raw.0,
        bet_amount: raw.1,
        player_choice: raw.2,
        house_choice: raw.3,
        result: raw.4,
        entropy_sequence_number: raw.5,
        random_number: raw.6,
        timestamp: raw.7,
        payout: raw.8,
        revealed: raw.9,
    }
}

#[derive(Clone, Debug)]
pub enum NetworkTarget {
    Mainnet { url: String },
    Testnet { url: String },
    LocalNode { url: String },
}

impl NetworkTarget {
    pub fn env(&self) -> DeploymentEnv {
        match self {
            NetworkTarget::Mainnet { .. } => DeploymentEnv::Main,
            NetworkTarget::Testnet { .. } => DeploymentEnv::Test,
            NetworkTarget::LocalNode { .. } => DeploymentEnv::Local,
        }
    }

    pub fn url(&self) -> &str {
        match self {
            NetworkTarget::Mainnet { url }
            | NetworkTarget::Testnet { url }
            | NetworkTarget::LocalNode { url } => url,
        }
    }
}

#[derive(Clone, Debug)]
pub enum WalletConfig {
    Keystore { owner: String, dir: PathBuf },
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub network: NetworkTarget,
    pub wallets: WalletConfig,
    pub contract: Option<Address>,
}

pub struct Clients {
    pub game: GameContract,
    pub player: Address,
    pub contract_address: Address,
    pub chain_id: u64,
}

/// Contract-wide totals from `getStats`.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct HouseStats {
    pub total_games: u64,
    pub wins: u64,
    pub losses: u64,
    pub draws: u64,
    pub house_balance: u128,
}

#[derive(Clone, Debug, PartialEq)]
pub struct LeaderboardEntry {
    pub address: Address,
    pub username: Option<String>,
    pub wins: u64,
    pub losses: u64,
    pub draws: u64,
    pub total_games: u64,
    pub total_wagered: u128,
    pub total_payout: u128,
    pub profit: i128,
    pub max_streak: u64,
    pub win_rate: f64,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum LeaderboardSort {
    Wins,
    MaxStreak,
    Profit,
    Losses,
    Draws,
    TotalWagered,
    TotalGames,
}

impl LeaderboardSort {
    pub fn label(self) -> &'static str {
        match self {
            LeaderboardSort::Wins => "Most Wins",
            LeaderboardSort::MaxStreak => "Max Streak",
            LeaderboardSort::Profit => "Highest Earnings",
            LeaderboardSort::Losses => "Most Losses",
            LeaderboardSort::Draws => "Most Draws",
            LeaderboardSort::TotalWagered => "Highest Bets",
            LeaderboardSort::TotalGames => "Most Games",
        }
    }

    pub fn next(self) -> Self {
        match self {
            LeaderboardSort::Wins => LeaderboardSort::MaxStreak,
            LeaderboardSort::MaxStreak => LeaderboardSort::Profit,
            LeaderboardSort::Profit => LeaderboardSort::Losses,
            LeaderboardSort::Losses => LeaderboardSort::Draws,
            LeaderboardSort::Draws => LeaderboardSort::TotalWagered,
            LeaderboardSort::TotalWagered => LeaderboardSort::TotalGames,
            LeaderboardSort::TotalGames => LeaderboardSort::Wins,
        }
    }

    fn compare(self, a: &LeaderboardEntry, b: &LeaderboardEntry) -> Ordering {
        match self {
            LeaderboardSort::Wins => {
                b.wins.cmp(&a.wins).then(b.total_games.cmp(&a.total_games))
            }
            LeaderboardSort::MaxStreak => {
                b.max_streak.cmp(&a.max_streak).then(b.wins.cmp(&a.wins))
            }
            LeaderboardSort::Profit => b.profit.cmp(&a.profit),
            LeaderboardSort::Losses => b
                .losses
                .cmp(&a.losses)
                .then(b.total_games.cmp(&a.total_games)),
            LeaderboardSort::Draws => b
                .draws
                .cmp(&a.draws)
                .then(b.total_games.cmp(&a.total_games)),
            LeaderboardSort::TotalWagered => b.total_wagered.cmp(&a.total_wagered),
            LeaderboardSort::TotalGames => b.total_games.cmp(&a.total_games),
        }
    }
}

/// Everything the UI needs for one frame.
#[derive(Clone, Debug)]
pub struct AppSnapshot {
    pub player: Address,
    pub username: Option<String>,
    pub network_label: String,
    pub chain_id: u64,
    pub contract_address: Address,
    pub balance: u128,
    pub pending_payout: u128,
    pub entropy_fee: u128,
    pub min_bet: u128,
    pub max_bet: u128,
    pub welcome_bonus: Option<u128>,
    pub selected_choice: Choice,
    pub stats: PlayerStatistics,
    pub house: Option<HouseStats>,
    pub history: Vec<GameRecord>,
    pub leaderboard: Vec<LeaderboardEntry>,
    pub leaderboard_sort: LeaderboardSort,
    pub awaiting_reveal: Option<u64>,
    pub last_outcome: Option<ResolutionOutcome>,
    pub status: String,
    pub errors: Vec<String>,
}

/// Live read collaborator for the resolver.
#[derive(Clone)]
pub struct ChainGameReader {
    game: GameContract,
}

impl ChainGameReader {
    pub fn new(game: GameContract) -> Self {
        Self { game }
    }
}

impl GameReader for ChainGameReader {
    fn fetch_game(&self, game_id: u64) -> impl Future<Output = Result<GameRecord>> + Send {
        let game = self.game.clone();
        async move {
            let raw = game
                .get_game(U256::from(game_id))
                .call()
                .await
                .wrap_err("getGame call failed")?;
            GameRecord::from_chain(U256::from(game_id), game_tuple_to_struct(raw))
        }
    }
}

pub struct AppController {
    pub clients: Clients,
    pub selected_choice: Choice,
    pub status: String,
    env: DeploymentEnv,
    network_url: String,
    poll_config: PollConfig,
    cached_history: Vec<GameRecord>,
    cached_stats: PlayerStatistics,
    cached_house: Option<HouseStats>,
    cached_balance: u128,
    cached_pending_payout: u128,
    cached_entropy_fee: u128,
    cached_min_bet: u128,
    cached_max_bet: u128,
    cached_username: Option<String>,
    welcome_bonus: Option<u128>,
    cached_leaderboard: Vec<LeaderboardEntry>,
    leaderboard_sort: LeaderboardSort,
    awaiting_reveal: Option<u64>,
    resolving: Option<CancelHandle>,
    last_outcome: Option<ResolutionOutcome>,
    errors: Vec<String>,
}

impl AppController {
    pub async fn new(config: AppConfig) -> Result<Self> {
        let AppConfig {
            network,
            wallets,
            contract,
        } = config;
        tracing::info!("Connecting to {} at {}", network.env(), network.url());
        Self::new_remote(network, wallets, contract).await
    }

    async fn new_remote(
        network: NetworkTarget,
        wallet_config: WalletConfig,
        contract_override: Option<Address>,
    ) -> Result<Self> {
        let env = network.env();
        let url = network.url().to_string();

        let provider = Provider::<Http>::try_from(url.as_str())
            .wrap_err_with(|| format!("Invalid RPC URL {url}"))?;
        let chain_id = provider
            .get_chainid()
            .await
            .wrap_err_with(|| format!("Failed to reach RPC endpoint at {url}"))?
            .as_u64();

        let WalletConfig::Keystore { owner, dir } = wallet_config;
        let descriptor =
            wallets::find_wallet(&dir, &owner).wrap_err("Unable to locate wallet")?;
        let wallet = wallets::unlock_wallet(&descriptor, chain_id)?;
        let player = wallet.address();
        tracing::info!(player = %format!("{player:#x}"), chain_id, "wallet unlocked");

        let contract_address = match contract_override {
            Some(address) => address,
            None => {
                let store = DeploymentStore::new(env)?;
                let record = store.latest()?.ok_or_else(|| {
                    eyre!(format_deployment_summary(env, &url, &store))
                })?;
                record.address()?
            }
        };

        tracing::info!(
            contract = %format::explorer_address_url(chain_id, &contract_address),
            "using chain program"
        );
        let middleware = Arc::new(SignerMiddleware::new(provider, wallet));
        let game = RockPaperScissors::new(contract_address, middleware);
        let clients = Clients {
            game,
            player,
            contract_address,
            chain_id,
        };

        Ok(Self::from_clients(clients, env, url))
    }

    fn from_clients(clients: Clients, env: DeploymentEnv, network_url: String) -> Self {
        Self {
            clients,
            selected_choice: Choice::Rock,
            status: String::from("Ready"),
            env,
            network_url,
            poll_config: PollConfig {
                display_delay: Some(REVEAL_DISPLAY_DELAY),
                ..PollConfig::default()
            },
            cached_history: Vec::new(),
            cached_stats: PlayerStatistics::default(),
            cached_house: None,
            cached_balance: 0,
            cached_pending_payout: 0,
            cached_entropy_fee: 0,
            cached_min_bet: 0,
            cached_max_bet: 0,
            cached_username: None,
            welcome_bonus: None,
            cached_leaderboard: Vec::new(),
            leaderboard_sort: LeaderboardSort::Wins,
            awaiting_reveal: None,
            resolving: None,
            last_outcome: None,
            errors: Vec::new(),
        }
    }

    fn refresh_interval(&self) -> Duration {
        REFRESH_INTERVAL
    }

    pub fn select_next_choice(&mut self) {
        self.selected_choice = self.selected_choice.next();
    }

    pub fn select_prev_choice(&mut self) {
        self.selected_choice = self.selected_choice.prev();
    }

    pub fn select_choice(&mut self, choice: Choice) {
        if choice != Choice::None {
            self.selected_choice = choice;
        }
    }

    pub fn cycle_leaderboard_sort(&mut self) {
        self.leaderboard_sort = self.leaderboard_sort.next();
        let sort = self.leaderboard_sort;
        self.cached_leaderboard.sort_by(|a, b| sort.compare(a, b));
    }

    pub fn set_status(&mut self, message: impl Into<String>) {
        self.status = message.into();
        self.errors.clear();
    }

    pub fn push_errors(&mut self, mut items: Vec<String>) {
        if items.is_empty() {
            return;
        }
        for item in &items {
            error!("{}", item);
        }
        self.errors.append(&mut items);
        if self.errors.len() > MAX_TRACKED_ERRORS {
            let drain = self.errors.len() - MAX_TRACKED_ERRORS;
            self.errors.drain(0..drain);
        }
    }

    pub fn snapshot(&self) -> AppSnapshot {
        AppSnapshot {
            player: self.clients.player,
            username: self.cached_username.clone(),
            network_label: format!("{} ({})", self.env, self.network_url),
            chain_id: self.clients.chain_id,
            contract_address: self.clients.contract_address,
            balance: self.cached_balance,
            pending_payout: self.cached_pending_payout,
            entropy_fee: self.cached_entropy_fee,
            min_bet: self.cached_min_bet,
            max_bet: self.cached_max_bet,
            welcome_bonus: self.welcome_bonus,
            selected_choice: self.selected_choice,
            stats: self.cached_stats.clone(),
            house: self.cached_house,
            history: self
                .cached_history
                .iter()
                .take(GAME_HISTORY_DEPTH)
                .cloned()
                .collect(),
            leaderboard: self.cached_leaderboard.clone(),
            leaderboard_sort: self.leaderboard_sort,
            awaiting_reveal: self.awaiting_reveal,
            last_outcome: self.last_outcome.clone(),
            status: self.status.clone(),
            errors: self.errors.iter().rev().take(5).cloned().collect(),
        }
    }

    pub fn ingest_chain_snapshot(&mut self, bundle: ChainSnapshot) {
        let ChainSnapshot {
            mut history,
            house,
            balance,
            pending_payout,
            entropy_fee,
            min_bet,
            max_bet,
            username,
            welcome_enabled,
            welcome_claimed,
            welcome_amount,
        } = bundle;

        self.cached_stats = stats::aggregate(&history);
        // Most recent first for display.
        history.sort_by(|a, b| b.game_id.cmp(&a.game_id));
        self.cached_history = history;
        self.cached_house = Some(house);
        self.cached_balance = balance;
        self.cached_pending_payout = pending_payout;
        self.cached_entropy_fee = entropy_fee;
        self.cached_min_bet = min_bet;
        self.cached_max_bet = max_bet;
        self.cached_username = username;
        self.welcome_bonus = if welcome_enabled && !welcome_claimed && welcome_amount > 0
        {
            Some(welcome_amount)
        } else {
            None
        };
    }

    pub fn ingest_leaderboard(&mut self, mut entries: Vec<LeaderboardEntry>) {
        let sort = self.leaderboard_sort;
        entries.sort_by(|a, b| sort.compare(a, b));
        self.cached_leaderboard = entries;
    }

    /// Submit a bet. Returns the confirmed receipt; the caller hands it to a
    /// resolution task and keeps the UI responsive in the meantime.
    pub async fn play(&mut self, amount_input: &str) -> Result<TransactionReceipt> {
        if self.resolving.is_some() {
            return Err(eyre!("A game is already awaiting its reveal"));
        }
        let amount = format::parse_eth(amount_input)
            .wrap_err_with(|| format!("Invalid bet amount {amount_input:?}"))?;
        self.validate_bet(amount)?;

        let entropy_fee = narrow_u128(
            self.clients
                .game
                .get_entropy_fee()
                .call()
                .await
                .wrap_err("getEntropyFee call failed")?,
            "entropy fee",
        )?;
        self.cached_entropy_fee = entropy_fee;

        // The player's half of the randomness commitment.
        let mut randomness = [0u8; 32];
        rand::rng().fill(&mut randomness[..]);
        debug!(
            commitment = %hex::encode(randomness),
            "submitting bet with fresh entropy commitment"
        );

        let total = amount.saturating_add(entropy_fee);
        let call = self
            .clients
            .game
            .play_game(self.selected_choice.as_u8(), randomness)
            .value(U256::from(total));
        let pending = call.send().await.wrap_err("playGame submission failed")?;
        let receipt = pending
            .await
            .wrap_err("Waiting for bet confirmation failed")?
            .ok_or_else(|| eyre!("Bet transaction was dropped from the mempool"))?;
        debug!(tx = ?receipt.transaction_hash, "bet confirmed");
        Ok(receipt)
    }

    fn validate_bet(&self, amount: u128) -> Result<()> {
        if amount == 0 {
            return Err(eyre!("Bet amount must be positive"));
        }
        if self.cached_min_bet > 0 && amount < self.cached_min_bet {
            return Err(eyre!(
                "Minimum bet is {} ETH",
                format::format_eth(self.cached_min_bet, 4)
            ));
        }
        if self.cached_max_bet > 0 && amount > self.cached_max_bet {
            return Err(eyre!(
                "Maximum bet is {} ETH",
                format::format_eth(self.cached_max_bet, 4)
            ));
        }
        Ok(())
    }

    /// Record the submitted game and hold the cancel handle for its
    /// resolution task.
    pub fn note_submitted(&mut self, receipt: &TransactionReceipt, cancel: CancelHandle) {
        let decoded = events::decode_receipt(receipt);
        let game_id = events::find_game_created(&decoded).map(|created| created.game_id);
        self.awaiting_reveal = game_id;
        self.resolving = Some(cancel);
        self.last_outcome = None;
        match game_id {
            Some(game_id) => {
                self.set_status(format!("Game #{game_id} submitted; waiting for the reveal..."))
            }
            None => self.set_status("Bet confirmed; waiting for the reveal..."),
        }
    }

    pub fn poll_config(&self) -> PollConfig {
        self.poll_config.clone()
    }

    pub fn reader(&self) -> ChainGameReader {
        ChainGameReader::new(self.clients.game.clone())
    }

    pub fn abandon_resolution(&mut self) {
        if let Some(handle) = self.resolving.take() {
            handle.cancel();
        }
        self.awaiting_reveal = None;
    }

    pub fn apply_resolution_event(&mut self, event: ResolutionEvent) {
        let awaited = self.awaiting_reveal.take();
        self.resolving = None;
        match event {
            ResolutionEvent::Finished { resolution } => match resolution {
                Resolution::Resolved(outcome) => {
                    let message = match outcome.result {
                        GameOutcome::Win => format!(
                            "You win! {} beats {} | Payout {} ETH",
                            outcome.player_choice,
                            outcome.house_choice,
                            format::format_eth(outcome.payout, 4)
                        ),
                        GameOutcome::Loss => format!(
                            "House wins: {} beats {}",
                            outcome.house_choice, outcome.player_choice
                        ),
                        GameOutcome::Draw => format!(
                            "Draw: both played {}. Stake refunded",
                            outcome.player_choice
                        ),
                        GameOutcome::Pending => String::from("Game resolved"),
                    };
                    self.set_status(message);
                    debug!(
                        tx = %format::explorer_tx_url(
                            self.clients.chain_id,
                            &outcome.transaction_hash
                        ),
                        "resolution recorded"
                    );
                    self.last_outcome = Some(outcome);
                }
                Resolution::TimedOut { attempts } => {
                    // Not a game result: the bet stays on chain and shows up
                    // in history once the oracle callback lands.
                    let game = awaited
                        .map(|id| format!("Game #{id}"))
                        .unwrap_or_else(|| String::from("Your game"));
                    self.status = String::from("Reveal still pending; check your history later");
                    self.push_errors(vec![format!(
                        "{game} was not revealed after {attempts} checks; it will appear in your history once the oracle responds"
                    )]);
                }
                Resolution::Cancelled => {}
            },
            ResolutionEvent::Failed { message } => {
                self.status = String::from("Resolution failed");
                self.push_errors(vec![message]);
            }
        }
    }

    pub async fn set_username(&mut self, name: &str) -> Result<()> {
        let name = name.trim();
        if name.is_empty() {
            return Err(eyre!("Username cannot be empty"));
        }
        if name.len() > 32 {
            return Err(eyre!("Username is limited to 32 characters"));
        }
        let taken = self
            .clients
            .game
            .is_username_taken(name.to_string())
            .call()
            .await
            .wrap_err("isUsernameTaken call failed")?;
        if taken && self.cached_username.as_deref() != Some(name) {
            return Err(eyre!("Username '{name}' is already taken"));
        }
        let call = self.clients.game.set_username(name.to_string());
        let pending = call
            .send()
            .await
            .wrap_err("setUsername submission failed")?;
        pending
            .await
            .wrap_err("Waiting for username confirmation failed")?;
        self.cached_username = Some(name.to_string());
        self.set_status(format!("Username set to '{name}'"));
        Ok(())
    }

    pub async fn claim_welcome_bonus(&mut self) -> Result<()> {
        let Some(amount) = self.welcome_bonus else {
            return Err(eyre!("No welcome bonus available to claim"));
        };
        let call = self.clients.game.claim_welcome_bonus();
        let pending = call
            .send()
            .await
            .wrap_err("claimWelcomeBonus submission failed")?;
        pending
            .await
            .wrap_err("Waiting for bonus confirmation failed")?;
        self.welcome_bonus = None;
        self.set_status(format!(
            "Welcome bonus of {} ETH claimed",
            format::format_eth(amount, 4)
        ));
        Ok(())
    }

    pub async fn withdraw_payout(&mut self) -> Result<()> {
        if self.cached_pending_payout == 0 {
            return Err(eyre!("No pending payout to withdraw"));
        }
        let amount = self.cached_pending_payout;
        let call = self.clients.game.withdraw_payout();
        let pending = call
            .send()
            .await
            .wrap_err("withdrawPayout submission failed")?;
        pending
            .await
            .wrap_err("Waiting for withdrawal confirmation failed")?;
        self.cached_pending_payout = 0;
        self.set_status(format!(
            "Withdrew {} ETH of pending payouts",
            format::format_eth(amount, 4)
        ));
        Ok(())
    }
}

fn format_deployment_summary(
    env: DeploymentEnv,
    url: &str,
    store: &DeploymentStore,
) -> String {
    format!(
        "No deployment recorded for {env} at {url}.\n\n\
         Deployment records file: {}\n\
         Pass --contract <address> or append a record to that file.",
        store.path().display()
    )
}

/// One full pass over the chain state this client renders.
#[derive(Clone, Debug)]
pub struct ChainSnapshot {
    pub history: Vec<GameRecord>,
    pub house: HouseStats,
    pub balance: u128,
    pub pending_payout: u128,
    pub entropy_fee: u128,
    pub min_bet: u128,
    pub max_bet: u128,
    pub username: Option<String>,
    pub welcome_enabled: bool,
    pub welcome_claimed: bool,
    pub welcome_amount: u128,
}

pub enum WorkerCommand {
    FetchNow,
    FetchLeaderboard,
    Shutdown,
}

pub enum WorkerEvent {
    Snapshot(ChainSnapshot),
    Leaderboard(Vec<LeaderboardEntry>),
}

#[derive(Debug)]
pub enum ResolutionEvent {
    Finished { resolution: Resolution },
    Failed { message: String },
}

async fn fetch_history(game: &GameContract, player: Address) -> Result<Vec<GameRecord>> {
    let ids = game
        .get_player_games(player)
        .call()
        .await
        .wrap_err("getPlayerGames call failed")?;
    let fetches = ids.into_iter().map(|id| {
        let game = game.clone();
        async move {
            let raw = game
                .get_game(id)
                .call()
                .await
                .wrap_err("getGame call failed")?;
            GameRecord::from_chain(id, game_tuple_to_struct(raw))
        }
    });
    let mut history = Vec::new();
    for result in join_all(fetches).await {
        match result {
            Ok(record) => history.push(record),
            // One bad record must not blank the whole panel.
            Err(err) => warn!(%err, "skipping unreadable game record"),
        }
    }
    Ok(history)
}

async fn fetch_chain_snapshot(
    game: &GameContract,
    player: Address,
) -> Result<ChainSnapshot> {
    let history = fetch_history(game, player).await?;

    let (total_games, wins, losses, draws, house_balance) = game
        .get_stats()
        .call()
        .await
        .wrap_err("getStats call failed")?;
    let house = HouseStats {
        total_games: narrow_u64(total_games, "house total games")?,
        wins: narrow_u64(wins, "house wins")?,
        losses: narrow_u64(losses, "house losses")?,
        draws: narrow_u64(draws, "house draws")?,
        house_balance: narrow_u128(house_balance, "house balance")?,
    };

    let balance = narrow_u128(
        game.client()
            .get_balance(player, None)
            .await
            .wrap_err("fetching wallet balance failed")?,
        "wallet balance",
    )?;
    let pending_payout = narrow_u128(
        game.pending_payouts(player)
            .call()
            .await
            .wrap_err("pendingPayouts call failed")?,
        "pending payout",
    )?;
    let entropy_fee = narrow_u128(
        game.get_entropy_fee()
            .call()
            .await
            .wrap_err("getEntropyFee call failed")?,
        "entropy fee",
    )?;
    let min_bet = narrow_u128(
        game.min_bet()
            .call()
            .await
            .wrap_err("minBet call failed")?,
        "min bet",
    )?;
    let max_bet = narrow_u128(
        game.max_bet()
            .call()
            .await
            .wrap_err("maxBet call failed")?,
        "max bet",
    )?;

    let username = game
        .get_username(player)
        .call()
        .await
        .wrap_err("getUsername call failed")?;
    let username = if username.is_empty() {
        None
    } else {
        Some(username)
    };

    let welcome_enabled = game
        .welcome_bonus_enabled()
        .call()
        .await
        .wrap_err("welcomeBonusEnabled call failed")?;
    let welcome_claimed = game
        .has_claimed_welcome_bonus(player)
        .call()
        .await
        .wrap_err("hasClaimedWelcomeBonus call failed")?;
    let welcome_amount = narrow_u128(
        game.welcome_bonus_amount()
            .call()
            .await
            .wrap_err("welcomeBonusAmount call failed")?,
        "welcome bonus",
    )?;

    Ok(ChainSnapshot {
        history,
        house,
        balance,
        pending_payout,
        entropy_fee,
        min_bet,
        max_bet,
        username,
        welcome_enabled,
        welcome_claimed,
        welcome_amount,
    })
}

async fn fetch_leaderboard(game: &GameContract) -> Result<Vec<LeaderboardEntry>> {
    let players = game
        .get_all_players()
        .call()
        .await
        .wrap_err("getAllPlayers call failed")?;
    let fetches = players.into_iter().map(|address| {
        let game = game.clone();
        async move {
            let (wins, losses, draws, total_wagered, total_payout, max_streak) = game
                .get_player_stats(address)
                .call()
                .await
                .wrap_err("getPlayerStats call failed")?;
            let username = game.get_username(address).call().await.unwrap_or_default();
            let wins = narrow_u64(wins, "wins")?;
            let losses = narrow_u64(losses, "losses")?;
            let draws = narrow_u64(draws, "draws")?;
            let total_wagered = narrow_u128(total_wagered, "total wagered")?;
            let total_payout = narrow_u128(total_payout, "total payout")?;
            let total_games = wins + losses + draws;
            Ok::<_, color_eyre::eyre::Report>(LeaderboardEntry {
                address,
                username: if username.is_empty() {
                    None
                } else {
                    Some(username)
                },
                wins,
                losses,
                draws,
                total_games,
                total_wagered,
                total_payout,
                profit: signed_delta(total_payout, total_wagered),
                max_streak: narrow_u64(max_streak, "max streak")?,
                win_rate: if total_games == 0 {
                    0.0
                } else {
                    wins as f64 / total_games as f64 * 100.0
                },
            })
        }
    });
    let mut entries = Vec::new();
    for result in join_all(fetches).await {
        match result {
            Ok(entry) => entries.push(entry),
            Err(err) => warn!(%err, "skipping leaderboard entry"),
        }
    }
    Ok(entries)
}

async fn chain_worker(
    poll_interval: Duration,
    game: GameContract,
    player: Address,
    mut cmd_rx: mpsc::UnboundedReceiver<WorkerCommand>,
    event_tx: mpsc::UnboundedSender<WorkerEvent>,
) -> Result<()> {
    async fn snapshot_pass(
        game: &GameContract,
        player: Address,
        event_tx: &mpsc::UnboundedSender<WorkerEvent>,
    ) -> Result<()> {
        let snapshot = fetch_chain_snapshot(game, player).await?;
        event_tx
            .send(WorkerEvent::Snapshot(snapshot))
            .map_err(|_| eyre!("snapshot receiver dropped"))?;
        Ok(())
    }

    async fn leaderboard_pass(
        game: &GameContract,
        event_tx: &mpsc::UnboundedSender<WorkerEvent>,
    ) -> Result<()> {
        let entries = fetch_leaderboard(game).await?;
        event_tx
            .send(WorkerEvent::Leaderboard(entries))
            .map_err(|_| eyre!("snapshot receiver dropped"))?;
        Ok(())
    }

    let mut ticker = time::interval(poll_interval);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Err(err) = snapshot_pass(&game, player, &event_tx).await {
                    warn!(?err, "chain snapshot fetch failed");
                }
            }
            cmd = cmd_rx.recv() => {
                let Some(cmd) = cmd else {
                    break;
                };
                match cmd {
                    WorkerCommand::FetchNow => {
                        if let Err(err) = snapshot_pass(&game, player, &event_tx).await {
                            warn!(?err, "chain snapshot fetch failed");
                        }
                    }
                    WorkerCommand::FetchLeaderboard => {
                        if let Err(err) = leaderboard_pass(&game, &event_tx).await {
                            warn!(?err, "leaderboard fetch failed");
                        }
                    }
                    WorkerCommand::Shutdown => break,
                }
            }
        }
    }
    Ok(())
}

pub async fn run_app(config: AppConfig) -> Result<()> {
    let controller = AppController::new(config).await?;
    let mut ui_state = ui::UiState::default();
    let mut input_events = ui::input_event_stream();

    tracing::info!("Starting UI");
    ui::terminal_enter(&mut ui_state)?;
    let res = run_loop(controller, &mut ui_state, &mut input_events).await;
    ui::terminal_exit()?;
    res
}

async fn run_loop(
    mut controller: AppController,
    ui_state: &mut ui::UiState,
    input_events: &mut ui::InputEventReceiver,
) -> Result<()> {
    tracing::info!("Running app loop");
    let poll_interval = controller.refresh_interval();
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
    let (event_tx, mut event_rx) = mpsc::unbounded_channel();
    let worker_handle = tokio::spawn(chain_worker(
        poll_interval,
        controller.clients.game.clone(),
        controller.clients.player,
        cmd_rx,
        event_tx,
    ));
    let _ = cmd_tx.send(WorkerCommand::FetchLeaderboard);

    let (resolution_tx, mut resolution_rx) =
        mpsc::unbounded_channel::<ResolutionEvent>();
    let mut worker_closed = false;

    loop {
        tokio::select! {
            maybe_event = event_rx.recv() => {
                match maybe_event {
                    Some(WorkerEvent::Snapshot(bundle)) => {
                        controller.ingest_chain_snapshot(bundle);
                        ui::draw(ui_state, &controller.snapshot())
                            .wrap_err("draw after snapshot refresh failed")?;
                    }
                    Some(WorkerEvent::Leaderboard(entries)) => {
                        controller.ingest_leaderboard(entries);
                        ui::draw(ui_state, &controller.snapshot())
                            .wrap_err("draw after leaderboard refresh failed")?;
                    }
                    None => {
                        tracing::warn!("chain worker channel closed");
                        worker_closed = true;
                        break;
                    }
                }
            }
            maybe_resolution = resolution_rx.recv() => {
                if let Some(event) = maybe_resolution {
                    controller.apply_resolution_event(event);
                    let _ = cmd_tx.send(WorkerCommand::FetchNow);
                    ui::draw(ui_state, &controller.snapshot())
                        .wrap_err("draw after resolution failed")?;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                controller.abandon_resolution();
                let _ = cmd_tx.send(WorkerCommand::Shutdown);
                break;
            }
            raw_event = ui::next_raw_event(input_events) => {
                let event = raw_event?;
                let Some(user_event) = ui::interpret_event(ui_state, event) else {
                    continue;
                };
                match user_event {
                    ui::UserEvent::Quit => {
                        controller.abandon_resolution();
                        let _ = cmd_tx.send(WorkerCommand::Shutdown);
                        break;
                    }
                    ui::UserEvent::Redraw => {}
                    ui::UserEvent::NextChoice => controller.select_next_choice(),
                    ui::UserEvent::PrevChoice => controller.select_prev_choice(),
                    ui::UserEvent::SelectChoice(choice) => controller.select_choice(choice),
                    ui::UserEvent::Refresh => {
                        let _ = cmd_tx.send(WorkerCommand::FetchNow);
                        controller.set_status("Refreshing...");
                    }
                    ui::UserEvent::OpenLeaderboard => {
                        let _ = cmd_tx.send(WorkerCommand::FetchLeaderboard);
                    }
                    ui::UserEvent::CycleLeaderboardSort => {
                        controller.cycle_leaderboard_sort();
                    }
                    ui::UserEvent::ConfirmBet { amount } => {
                        controller.set_status(format!(
                            "Placing {} ETH on {}...",
                            amount.trim(),
                            controller.selected_choice
                        ));
                        ui::draw(ui_state, &controller.snapshot())
                            .wrap_err("draw while submitting bet failed")?;
                        match controller.play(&amount).await {
                            Ok(receipt) => {
                                let (cancel, mut token) = resolver::cancel_pair();
                                controller.note_submitted(&receipt, cancel);
                                let reader = controller.reader();
                                let config = controller.poll_config();
                                let tx = resolution_tx.clone();
                                tokio::spawn(async move {
                                    let event = match resolver::resolve_game(
                                        &reader, &receipt, &config, &mut token,
                                    )
                                    .await
                                    {
                                        Ok(resolution) => {
                                            ResolutionEvent::Finished { resolution }
                                        }
                                        Err(err) => ResolutionEvent::Failed {
                                            message: format!("{err:#}"),
                                        },
                                    };
                                    let _ = tx.send(event);
                                });
                                let _ = cmd_tx.send(WorkerCommand::FetchNow);
                            }
                            Err(err) => {
                                error!(error = %err, "bet failed");
                                controller.push_errors(vec![format!("Bet failed: {err:#}")]);
                            }
                        }
                    }
                    ui::UserEvent::ConfirmUsername { name } => {
                        if let Err(err) = controller.set_username(&name).await {
                            error!(error = %err, "setting username failed");
                            controller
                                .push_errors(vec![format!("Username change failed: {err:#}")]);
                        }
                        let _ = cmd_tx.send(WorkerCommand::FetchNow);
                    }
                    ui::UserEvent::ClaimBonus => {
                        if let Err(err) = controller.claim_welcome_bonus().await {
                            error!(error = %err, "claiming welcome bonus failed");
                            controller
                                .push_errors(vec![format!("Bonus claim failed: {err:#}")]);
                        }
                        let _ = cmd_tx.send(WorkerCommand::FetchNow);
                    }
                    ui::UserEvent::WithdrawPayout => {
                        if let Err(err) = controller.withdraw_payout().await {
                            error!(error = %err, "withdrawing payout failed");
                            controller
                                .push_errors(vec![format!("Withdrawal failed: {err:#}")]);
                        }
                        let _ = cmd_tx.send(WorkerCommand::FetchNow);
                    }
                }
                ui::draw(ui_state, &controller.snapshot())
                    .wrap_err("draw after user event failed")?;
            }
        }
    }

    let _ = cmd_tx.send(WorkerCommand::Shutdown);
    match worker_handle.await {
        Ok(Ok(())) => {
            if worker_closed {
                return Err(eyre!(
                    "Chain worker exited unexpectedly; check the RPC connection"
                ));
            }
        }
        Ok(Err(err)) => {
            return Err(err).wrap_err("chain worker failed");
        }
        Err(err) => {
            return Err(eyre!(err)).wrap_err("chain worker panicked");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;
    use crate::types::{
        Choice,
        GameOutcome,
    };
    use ethers::types::H256;

    fn test_controller() -> AppController {
        let provider = Provider::<Http>::try_from(DEFAULT_LOCAL_RPC_URL).unwrap();
        let wallet = LocalWallet::from_bytes(&[1u8; 32]).unwrap();
        let player = wallet.address();
        let middleware = Arc::new(SignerMiddleware::new(provider, wallet));
        let game = RockPaperScissors::new(Address::from([9u8; 20]), middleware);
        let clients = Clients {
            game,
            player,
            contract_address: Address::from([9u8; 20]),
            chain_id: 31337,
        };
        AppController::from_clients(
            clients,
            DeploymentEnv::Local,
            DEFAULT_LOCAL_RPC_URL.to_string(),
        )
    }

    fn entry(wins: u64, max_streak: u64, profit: i128) -> LeaderboardEntry {
        LeaderboardEntry {
            address: Address::from_low_u64_be(wins),
            username: None,
            wins,
            losses: 0,
            draws: 0,
            total_games: wins,
            total_wagered: 0,
            total_payout: 0,
            profit,
            max_streak,
            win_rate: 0.0,
        }
    }

    #[test]
    fn validate_bet__enforces_chain_limits() {
        // given
        let mut controller = test_controller();
        controller.cached_min_bet = 100;
        controller.cached_max_bet = 1_000;

        // then
        assert!(controller.validate_bet(0).is_err());
        assert!(controller.validate_bet(99).is_err());
        assert!(controller.validate_bet(100).is_ok());
        assert!(controller.validate_bet(1_000).is_ok());
        assert!(controller.validate_bet(1_001).is_err());
    }

    #[test]
    fn cycle_leaderboard_sort__reorders_cached_entries() {
        // given
        let mut controller = test_controller();
        controller.ingest_leaderboard(vec![
            entry(1, 9, -50),
            entry(5, 2, 10),
            entry(3, 4, 99),
        ]);
        // Default sort is by wins.
        assert_eq!(controller.cached_leaderboard[0].wins, 5);

        // when
        controller.cycle_leaderboard_sort();

        // then: now sorted by max streak
        assert_eq!(controller.leaderboard_sort, LeaderboardSort::MaxStreak);
        assert_eq!(controller.cached_leaderboard[0].max_streak, 9);
    }

    #[test]
    fn apply_resolution_event__timeout_is_not_a_game_result() {
        // given
        let mut controller = test_controller();
        controller.awaiting_reveal = Some(12);

        // when
        controller.apply_resolution_event(ResolutionEvent::Finished {
            resolution: Resolution::TimedOut { attempts: 30 },
        });

        // then
        assert!(controller.last_outcome.is_none());
        assert!(controller.status.contains("check your history"));
        assert!(controller.errors.iter().any(|e| e.contains("Game #12")));
    }

    #[test]
    fn apply_resolution_event__win_sets_outcome_and_status() {
        // given
        let mut controller = test_controller();
        let outcome = ResolutionOutcome {
            game_id: 4,
            player_choice: Choice::Rock,
            house_choice: Choice::Scissors,
            result: GameOutcome::Win,
            bet_amount: 100,
            payout: 195,
            transaction_hash: H256::zero(),
            random_number: H256::zero(),
        };

        // when
        controller.apply_resolution_event(ResolutionEvent::Finished {
            resolution: Resolution::Resolved(outcome.clone()),
        });

        // then
        assert_eq!(controller.last_outcome, Some(outcome));
        assert!(controller.status.starts_with("You win!"));
    }
}
