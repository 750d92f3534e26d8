//! Composition root.
//!
//! [App] owns the committed [Store], the deliver and check contexts, the
//! block governor and every service handle, and exposes the block-level call
//! surface (`info`, `init_chain`, `check_tx`, `deliver_tx`, `begin_block`,
//! `end_block`, `commit`). Calls must arrive in the order
//! `begin_block → deliver_tx* → end_block → commit`; anything else is
//! rejected with a [SequenceError].

use crate::{
    admission::{Admitted, Pipeline},
    app_hash::{app_hash, SubsystemDigest},
    bandwidth::{
        BandwidthLedger, BandwidthModel, BlockGovernor, CostOracle, LinearModel, MessageCostOracle,
        Regenerator,
    },
    error::{AdmissionError, BlockError, FatalError, HashError, SequenceError, CODE_OK},
    invariants::InvariantChecker,
    layer::{Executor, Runtime},
    link::{LinkIndex, MemoryLinkIndex},
    rank::{ComputeUnit, DegreeRank, RankEngine, SearchError},
    round_scheduler::{build_snapshot, RoundScheduler},
    state::{
        load_account, load_bandwidth, load_bandwidth_params, load_link_count, load_model_params,
        load_rank_params, Layer, State, Status,
    },
    store::Store,
};
use anyhow::anyhow;
use commonware_cryptography::ed25519::PublicKey;
use commonware_utils::hex;
use linkchain_types::{
    execution::{Account, AccountBandwidth},
    BandwidthParams, BlockHeader, Cid, Event, Genesis, Key, ModelParams, RankParams,
    ValidatorUpdate, Value,
};
use std::{collections::BTreeMap, mem, num::NonZeroU64};
use tracing::{debug, info};

/// Node-local settings. Chain parameters live in state, installed at genesis.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AppConfig {
    /// Run invariant checks every this many blocks (0 disables them).
    pub inv_check_period: u64,
    pub allow_search: bool,
    pub compute_unit: ComputeUnit,
}

/// Builds the bandwidth model named by a parameter set, if this node knows it.
pub type ModelFactory = fn(&ModelParams) -> Option<Box<dyn BandwidthModel>>;

pub fn default_model(params: &ModelParams) -> Option<Box<dyn BandwidthModel>> {
    match params.version {
        LinearModel::VERSION => Some(Box::new(LinearModel::new(*params))),
        _ => None,
    }
}

/// Service handles injected into the [App].
pub struct Services {
    pub oracle: Box<dyn CostOracle>,
    pub executor: Box<dyn Executor>,
    pub links: Box<dyn LinkIndex>,
    pub rank: Box<dyn RankEngine>,
    pub model: ModelFactory,
}

impl Services {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            oracle: Box::new(MessageCostOracle),
            executor: Box::new(Runtime),
            links: Box::<MemoryLinkIndex>::default(),
            rank: Box::new(DegreeRank::new(config.compute_unit, config.allow_search)),
            model: default_model,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Info {
    pub last_height: u64,
    pub last_app_hash: Vec<u8>,
}

/// Outcome of `check_tx` or `deliver_tx`. A non-zero code is a rejection.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TxResponse {
    pub code: u32,
    pub log: String,
    /// Bandwidth charged to the payer.
    pub bandwidth: u64,
    pub events: Vec<Event>,
}

impl TxResponse {
    pub fn is_ok(&self) -> bool {
        self.code == CODE_OK
    }
}

impl From<Result<Admitted, AdmissionError>> for TxResponse {
    fn from(result: Result<Admitted, AdmissionError>) -> Self {
        match result {
            Ok(admitted) => Self {
                code: CODE_OK,
                log: String::new(),
                bandwidth: admitted.cost,
                events: admitted.events,
            },
            Err(err) => Self {
                code: err.code(),
                log: err.to_string(),
                bandwidth: 0,
                events: Vec::new(),
            },
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EndBlockResponse {
    pub validator_updates: Vec<ValidatorUpdate>,
    pub events: Vec<Event>,
}

/// Chain parameters in effect, read from state.
struct Chain {
    bandwidth: BandwidthParams,
    model: Box<dyn BandwidthModel>,
    scheduler: RoundScheduler,
}

impl Chain {
    fn new(
        bandwidth: BandwidthParams,
        model: &ModelParams,
        rank: &RankParams,
        factory: ModelFactory,
    ) -> Result<Self, FatalError> {
        let period = NonZeroU64::new(rank.calculation_period)
            .ok_or_else(|| FatalError::Storage(anyhow!("rank calculation period is zero")))?;
        Ok(Self {
            bandwidth,
            model: factory(model).ok_or(FatalError::UnsupportedModel(model.version))?,
            scheduler: RoundScheduler::new(period),
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Phase {
    Idle,
    InBlock(BlockHeader),
    Ended(BlockHeader),
}

fn install_genesis(
    state: &mut dyn State,
    genesis: &Genesis,
    model: &dyn BandwidthModel,
) -> anyhow::Result<()> {
    for (address, balance) in &genesis.accounts {
        state.insert(
            Key::Account(address.clone()),
            Value::Account(Account {
                nonce: 0,
                balance: *balance,
            }),
        )?;
        BandwidthLedger::save(
            state,
            address,
            AccountBandwidth::full(model.capacity(*balance), 0),
        )?;
    }
    state.insert(Key::BandwidthParams, Value::BandwidthParams(genesis.bandwidth))?;
    state.insert(Key::ModelParams, Value::ModelParams(genesis.model))?;
    state.insert(Key::RankParams, Value::RankParams(genesis.rank))?;
    state.insert(Key::Validators, Value::Validators(genesis.validators.clone()))?;
    state.insert(Key::LinkCount, Value::LinkCount(0))?;
    Ok(())
}

fn compare_validators(
    computed: &[ValidatorUpdate],
    requested: &[ValidatorUpdate],
) -> Result<(), FatalError> {
    let mut requested = requested.to_vec();
    requested.sort();
    if computed.len() != requested.len() {
        return Err(FatalError::ValidatorSetMismatch(format!(
            "genesis has {} validators, consensus requested {}",
            computed.len(),
            requested.len()
        )));
    }
    for (index, (ours, theirs)) in computed.iter().zip(&requested).enumerate() {
        if ours != theirs {
            return Err(FatalError::ValidatorSetMismatch(format!(
                "entry {index}: genesis {} (power {}), requested {} (power {})",
                hex(ours.public_key.as_ref()),
                ours.power,
                hex(theirs.public_key.as_ref()),
                theirs.power
            )));
        }
    }
    Ok(())
}

pub struct App<S: Store> {
    store: S,
    services: Services,
    invariants: InvariantChecker,
    chain: Option<Chain>,

    deliver: BTreeMap<Key, Status>,
    check: BTreeMap<Key, Status>,
    governor: BlockGovernor,
    regenerator: Regenerator,

    phase: Phase,
    last_height: u64,
    last_app_hash: Vec<u8>,
}

impl<S: Store> App<S> {
    /// Start from whatever `store` has committed.
    ///
    /// On a non-empty store the link index and rank engine are rebuilt from
    /// the state at the last round boundary. Failing to do so is fatal.
    pub fn open(store: S, config: AppConfig, services: Services) -> Result<Self, FatalError> {
        let height = store.height();
        let mut app = Self {
            store,
            services,
            invariants: InvariantChecker::new(config.inv_check_period),
            chain: None,
            deliver: BTreeMap::new(),
            check: BTreeMap::new(),
            governor: BlockGovernor::new(0),
            regenerator: Regenerator::default(),
            phase: Phase::Idle,
            last_height: height,
            last_app_hash: Vec::new(),
        };
        if height == 0 {
            info!("no committed state; waiting for init_chain");
            return Ok(app);
        }

        let bandwidth =
            load_bandwidth_params(&app.store)?.ok_or(FatalError::MissingParams(height))?;
        let model = load_model_params(&app.store)?.ok_or(FatalError::MissingParams(height))?;
        let rank = load_rank_params(&app.store)?.ok_or(FatalError::MissingParams(height))?;
        let chain = Chain::new(bandwidth, &model, &rank, app.services.model)?;

        let boundary = chain.scheduler.boundary(height);
        {
            let snapshot = build_snapshot(&app.store, boundary)?;
            let reconstruct = |source: anyhow::Error| FatalError::UnreconstructableSnapshot { boundary, source };
            app.services
                .links
                .load(&*snapshot, &app.store, height)
                .map_err(reconstruct)?;
            let at_boundary = load_link_count(&*snapshot).map_err(reconstruct)?;
            let links = usize::try_from(at_boundary)
                .ok()
                .and_then(|count| app.services.links.links().get(..count))
                .ok_or_else(|| reconstruct(anyhow!("{at_boundary} links at boundary")))?;
            app.services
                .rank
                .load(links, boundary, height, chain.scheduler)
                .map_err(reconstruct)?;
        }

        app.governor.set_max(chain.bandwidth.max_block_bandwidth);
        app.chain = Some(chain);
        app.last_app_hash = app.current_hash(height)?;
        info!(
            height,
            boundary,
            links = app.services.links.links().len(),
            hash = %hex(&app.last_app_hash),
            "application restored"
        );
        Ok(app)
    }

    fn current_hash(&self, height: u64) -> Result<Vec<u8>, HashError> {
        let link = self.services.links.digest();
        let rank = self.services.rank.digest();
        app_hash(
            height,
            SubsystemDigest {
                digest: link.as_ref(),
                height: self.services.links.height(),
            },
            SubsystemDigest {
                digest: rank.as_ref(),
                height: self.services.rank.height(),
            },
        )
    }

    pub fn info(&self) -> Info {
        Info {
            last_height: self.last_height,
            last_app_hash: self.last_app_hash.clone(),
        }
    }

    /// Install genesis and return the validator set, sorted by public key.
    ///
    /// If `requested` is non-empty it must match the genesis set exactly.
    /// Genesis state is committed together with the first block.
    pub fn init_chain(
        &mut self,
        genesis: &[u8],
        requested: &[ValidatorUpdate],
    ) -> Result<Vec<ValidatorUpdate>, BlockError> {
        if self.chain.is_some() {
            return Err(SequenceError::AlreadyInitialized.into());
        }
        let genesis = Genesis::parse(genesis).map_err(FatalError::from)?;
        if !requested.is_empty() {
            compare_validators(&genesis.validators, requested)?;
        }
        let chain = Chain::new(
            genesis.bandwidth,
            &genesis.model,
            &genesis.rank,
            self.services.model,
        )?;

        let mut layer = Layer::new(&self.store);
        install_genesis(&mut layer, &genesis, chain.model.as_ref()).map_err(FatalError::Storage)?;
        let pending = layer.into_pending();
        self.services
            .rank
            .load(&[], 0, 0, chain.scheduler)
            .map_err(FatalError::Storage)?;

        self.check = pending.clone();
        self.deliver = pending;
        self.governor.set_max(chain.bandwidth.max_block_bandwidth);
        self.chain = Some(chain);
        info!(
            chain_id = %genesis.chain_id,
            accounts = genesis.accounts.len(),
            validators = genesis.validators.len(),
            "chain initialized"
        );
        Ok(genesis.validators)
    }

    /// Mempool admission against the check context. Never touches the block.
    pub fn check_tx(&mut self, tx: &[u8]) -> TxResponse {
        let result = self.admit_check(tx);
        if let Err(err) = &result {
            debug!(code = err.code(), %err, "check rejected");
        }
        result.into()
    }

    fn admit_check(&mut self, raw: &[u8]) -> Result<Admitted, AdmissionError> {
        let chain = self.chain.as_ref().ok_or(SequenceError::NotInitialized)?;
        let pipeline = Pipeline {
            oracle: self.services.oracle.as_ref(),
            model: chain.model.as_ref(),
            executor: self.services.executor.as_ref(),
            params: &chain.bandwidth,
        };
        let mut layer = Layer::with_pending(&self.store, mem::take(&mut self.check));
        let result = pipeline.check(&mut layer, &self.governor, raw, self.last_height + 1);
        self.check = layer.into_pending();
        result
    }

    pub fn deliver_tx(&mut self, tx: &[u8]) -> TxResponse {
        let result = self.admit_deliver(tx);
        if let Err(err) = &result {
            debug!(code = err.code(), %err, "delivery rejected");
        }
        result.into()
    }

    fn admit_deliver(&mut self, raw: &[u8]) -> Result<Admitted, AdmissionError> {
        let chain = self.chain.as_ref().ok_or(SequenceError::NotInitialized)?;
        let Phase::InBlock(header) = self.phase else {
            return Err(SequenceError::NoBlock.into());
        };
        let pipeline = Pipeline {
            oracle: self.services.oracle.as_ref(),
            model: chain.model.as_ref(),
            executor: self.services.executor.as_ref(),
            params: &chain.bandwidth,
        };
        let mut layer = Layer::with_pending(&self.store, mem::take(&mut self.deliver));
        let result = pipeline.deliver(
            &mut layer,
            &mut self.governor,
            &mut self.regenerator,
            raw,
            header.height,
        );
        self.deliver = layer.into_pending();

        let admitted = result?;
        self.services.links.append(&admitted.new_links);
        Ok(admitted)
    }

    pub fn begin_block(&mut self, header: BlockHeader) -> Result<Vec<Event>, SequenceError> {
        if self.chain.is_none() {
            return Err(SequenceError::NotInitialized);
        }
        if let Phase::InBlock(current) | Phase::Ended(current) = self.phase {
            return Err(SequenceError::BlockInProgress(current.height));
        }
        let expected = self.last_height + 1;
        if header.height != expected {
            return Err(SequenceError::UnexpectedHeight {
                expected,
                got: header.height,
            });
        }

        self.governor.reset();
        self.regenerator.clear();
        self.phase = Phase::InBlock(header);
        debug!(height = header.height, time_ms = header.time_ms, "block started");
        Ok(Vec::new())
    }

    /// Regenerate bandwidth, advance rank bookkeeping and run due invariant
    /// checks.
    pub fn end_block(&mut self) -> Result<EndBlockResponse, BlockError> {
        let Phase::InBlock(header) = self.phase else {
            return Err(SequenceError::NoBlock.into());
        };
        let chain = self.chain.as_ref().ok_or(SequenceError::NotInitialized)?;
        let height = header.height;

        let mut layer = Layer::with_pending(&self.store, mem::take(&mut self.deliver));
        let mut events = self
            .regenerator
            .end_block(&mut layer, chain.model.as_ref(), height)
            .map_err(FatalError::Storage)?;
        if let Some(event) = self
            .services
            .rank
            .end_block(height, self.services.links.links())
        {
            events.push(event);
        }
        if self.invariants.is_due(height) {
            self.invariants
                .check(&layer, &self.governor, self.services.links.links(), height)?;
        }
        self.deliver = layer.into_pending();
        self.phase = Phase::Ended(header);

        info!(
            height,
            spent = self.governor.spent_so_far(),
            max = self.governor.max_allowed(),
            events = events.len(),
            "block ended"
        );
        Ok(EndBlockResponse {
            validator_updates: Vec::new(),
            events,
        })
    }

    /// Persist the block and return the application hash.
    ///
    /// History below the current round boundary is pruned once the block is
    /// durable; restarts only ever read the boundary snapshot.
    pub async fn commit(&mut self) -> Result<Vec<u8>, BlockError> {
        let header = match self.phase {
            Phase::Ended(header) => header,
            Phase::InBlock(header) => {
                return Err(SequenceError::BlockNotEnded(header.height).into())
            }
            Phase::Idle => return Err(SequenceError::NoBlock.into()),
        };
        let height = header.height;

        let changes: Vec<(Key, Status)> = mem::take(&mut self.deliver).into_iter().collect();
        let written = changes.len();
        self.store
            .commit(height, changes)
            .await
            .map_err(FatalError::Storage)?;
        if let Some(chain) = &self.chain {
            let boundary = chain.scheduler.boundary(height);
            self.store
                .prune(boundary)
                .await
                .map_err(FatalError::Storage)?;
        }
        self.services.links.commit(height);
        let hash = self.current_hash(height).map_err(FatalError::from)?;

        self.check.clear();
        self.last_height = height;
        self.last_app_hash = hash.clone();
        self.phase = Phase::Idle;
        info!(
            height,
            changes = written,
            links = self.services.links.links().len(),
            hash = %hex(&hash),
            "committed"
        );
        Ok(hash)
    }

    pub fn height(&self) -> u64 {
        self.last_height
    }

    /// Committed account.
    pub fn account(&self, account: &PublicKey) -> anyhow::Result<Option<Account>> {
        load_account(&self.store, account)
    }

    /// Committed bandwidth balance (absent until first charged).
    pub fn bandwidth(&self, account: &PublicKey) -> anyhow::Result<Option<AccountBandwidth>> {
        load_bandwidth(&self.store, account)
    }

    /// Spent and maximum bandwidth of the current (or last) block.
    pub fn block_bandwidth(&self) -> (u64, u64) {
        (self.governor.spent_so_far(), self.governor.max_allowed())
    }

    pub fn link_count(&self) -> usize {
        self.services.links.links().len()
    }

    pub fn rank(&self, cid: &Cid) -> u64 {
        self.services.rank.rank(cid)
    }

    pub fn search(&self, cid: &Cid, limit: usize) -> Result<Vec<(Cid, u64)>, SearchError> {
        self.services.rank.search(cid, limit)
    }

    pub fn into_store(self) -> S {
        self.store
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        error::{
            CODE_EXCEEDED_MAX_BLOCK_BANDWIDTH, CODE_EXECUTION, CODE_NOT_ENOUGH_BANDWIDTH,
            CODE_OUT_OF_SEQUENCE,
        },
        mocks::{
            bandwidth_params, cid, create_account_keypair, genesis_doc, genesis_json, link_tx,
            rank_params, send_tx,
        },
        store::{Journal, Memory},
    };
    use commonware_codec::Encode;
    use commonware_runtime::{deterministic, Metrics as _, Runner};
    use commonware_cryptography::ed25519::PrivateKey;

    struct Fixture {
        alice: PrivateKey,
        alice_pk: PublicKey,
        bob_pk: PublicKey,
        genesis: Vec<u8>,
        validators: Vec<PublicKey>,
    }

    fn fixture() -> Fixture {
        let (alice, alice_pk) = create_account_keypair(1);
        let (_, bob_pk) = create_account_keypair(2);
        let validators = vec![create_account_keypair(10).1, create_account_keypair(11).1];
        let doc = genesis_doc(&[(alice_pk.clone(), 1_000), (bob_pk.clone(), 50)], &validators);
        Fixture {
            alice,
            alice_pk,
            bob_pk,
            genesis: genesis_json(&doc),
            validators,
        }
    }

    fn open<S: Store>(store: S, config: AppConfig) -> App<S> {
        let services = Services::new(&config);
        App::open(store, config, services).unwrap()
    }

    fn header(height: u64) -> BlockHeader {
        BlockHeader {
            height,
            time_ms: height * 1_000,
        }
    }

    async fn run_block<S: Store>(app: &mut App<S>, height: u64, txs: &[Vec<u8>]) -> Vec<u8> {
        app.begin_block(header(height)).unwrap();
        for tx in txs {
            let response = app.deliver_tx(tx);
            assert!(response.is_ok(), "{}", response.log);
        }
        app.end_block().unwrap();
        app.commit().await.unwrap()
    }

    /// One new link per block: `n{height}` -> `hub`.
    fn block_txs(alice: &PrivateKey, height: u64) -> Vec<Vec<u8>> {
        let from = format!("n{height}");
        vec![link_tx(alice, height - 1, &[(from.as_str(), "hub")]).encode().to_vec()]
    }

    #[test]
    fn test_block_lifecycle() {
        let runner = deterministic::Runner::default();
        runner.start(|_| async move {
            let chain = fixture();
            let mut app = open(Memory::default(), AppConfig::default());
            assert_eq!(
                app.info(),
                Info {
                    last_height: 0,
                    last_app_hash: Vec::new()
                }
            );

            let validators = app.init_chain(&chain.genesis, &[]).unwrap();
            assert_eq!(validators.len(), 2);
            assert!(validators.windows(2).all(|pair| pair[0] < pair[1]));

            app.begin_block(header(1)).unwrap();
            let response = app.deliver_tx(&link_tx(&chain.alice, 0, &[("a", "b"), ("a", "c")]).encode());
            assert!(response.is_ok(), "{}", response.log);
            // base 2 (tx + message) plus one per new edge
            assert_eq!(response.bandwidth, 4);
            assert_eq!(app.block_bandwidth(), (4, 1_000));
            assert_eq!(
                response.events.last(),
                Some(&Event::BandwidthCharged {
                    account: chain.alice_pk.clone(),
                    amount: 4,
                    remaining: 996
                })
            );
            app.end_block().unwrap();
            let hash = app.commit().await.unwrap();

            assert_eq!(hash.len(), 32);
            assert_eq!(app.info().last_height, 1);
            assert_eq!(app.info().last_app_hash, hash);
            assert_eq!(app.link_count(), 2);
            assert_eq!(app.account(&chain.alice_pk).unwrap().unwrap().nonce, 1);
            let bandwidth = app.bandwidth(&chain.alice_pk).unwrap().unwrap();
            assert_eq!(bandwidth.remaining, 996);
            assert_eq!(bandwidth.capacity, 1_000);
        });
    }

    #[test]
    fn test_genesis_failures_are_fatal() {
        let runner = deterministic::Runner::default();
        runner.start(|_| async move {
            let chain = fixture();
            let mut app = open(Memory::default(), AppConfig::default());
            assert!(matches!(
                app.init_chain(b"{not json", &[]),
                Err(BlockError::Fatal(FatalError::MalformedGenesis(_)))
            ));

            let requested = vec![ValidatorUpdate {
                public_key: chain.validators[0].clone(),
                power: 10,
            }];
            assert!(matches!(
                app.init_chain(&chain.genesis, &requested),
                Err(BlockError::Fatal(FatalError::ValidatorSetMismatch(_)))
            ));

            let wrong_power: Vec<ValidatorUpdate> = chain
                .validators
                .iter()
                .map(|public_key| ValidatorUpdate {
                    public_key: public_key.clone(),
                    power: 11,
                })
                .collect();
            assert!(matches!(
                app.init_chain(&chain.genesis, &wrong_power),
                Err(BlockError::Fatal(FatalError::ValidatorSetMismatch(_)))
            ));

            // The same set in any order is accepted
            let mut requested: Vec<ValidatorUpdate> = chain
                .validators
                .iter()
                .map(|public_key| ValidatorUpdate {
                    public_key: public_key.clone(),
                    power: 10,
                })
                .collect();
            requested.reverse();
            app.init_chain(&chain.genesis, &requested).unwrap();
            assert!(matches!(
                app.init_chain(&chain.genesis, &[]),
                Err(BlockError::Sequence(SequenceError::AlreadyInitialized))
            ));
        });
    }

    #[test]
    fn test_out_of_sequence_calls() {
        let runner = deterministic::Runner::default();
        runner.start(|_| async move {
            let chain = fixture();
            let mut app = open(Memory::default(), AppConfig::default());
            let tx = link_tx(&chain.alice, 0, &[("a", "b")]).encode();

            assert_eq!(app.check_tx(&tx).code, CODE_OUT_OF_SEQUENCE);
            assert_eq!(app.begin_block(header(1)), Err(SequenceError::NotInitialized));

            app.init_chain(&chain.genesis, &[]).unwrap();
            assert_eq!(app.deliver_tx(&tx).code, CODE_OUT_OF_SEQUENCE);
            assert!(matches!(
                app.end_block(),
                Err(BlockError::Sequence(SequenceError::NoBlock))
            ));
            assert!(matches!(
                app.commit().await,
                Err(BlockError::Sequence(SequenceError::NoBlock))
            ));
            assert_eq!(
                app.begin_block(header(2)),
                Err(SequenceError::UnexpectedHeight {
                    expected: 1,
                    got: 2
                })
            );

            app.begin_block(header(1)).unwrap();
            assert_eq!(
                app.begin_block(header(1)),
                Err(SequenceError::BlockInProgress(1))
            );
            assert!(matches!(
                app.commit().await,
                Err(BlockError::Sequence(SequenceError::BlockNotEnded(1)))
            ));
            app.end_block().unwrap();
            assert_eq!(app.deliver_tx(&tx).code, CODE_OUT_OF_SEQUENCE);
            app.commit().await.unwrap();
        });
    }

    #[test]
    fn test_check_context_is_isolated() {
        let runner = deterministic::Runner::default();
        runner.start(|_| async move {
            let chain = fixture();
            let mut app = open(Memory::default(), AppConfig::default());
            app.init_chain(&chain.genesis, &[]).unwrap();

            // Checks build on each other but never reach the block
            assert!(app.check_tx(&link_tx(&chain.alice, 0, &[("a", "b")]).encode()).is_ok());
            assert!(app.check_tx(&link_tx(&chain.alice, 1, &[("a", "b")]).encode()).is_ok());
            assert_eq!(app.block_bandwidth().0, 0);

            // Delivery still expects nonce 0
            app.begin_block(header(1)).unwrap();
            assert!(app
                .deliver_tx(&link_tx(&chain.alice, 0, &[("a", "b")]).encode())
                .is_ok());
            app.end_block().unwrap();
            app.commit().await.unwrap();

            // After commit the check context restarts from committed state
            assert!(!app.check_tx(&link_tx(&chain.alice, 2, &[("x", "y")]).encode()).is_ok());
            assert!(app.check_tx(&link_tx(&chain.alice, 1, &[("x", "y")]).encode()).is_ok());
        });
    }

    #[test]
    fn test_check_and_deliver_report_same_base_cost() {
        let runner = deterministic::Runner::default();
        runner.start(|_| async move {
            let chain = fixture();
            let mut app = open(Memory::default(), AppConfig::default());
            app.init_chain(&chain.genesis, &[]).unwrap();

            let send = send_tx(&chain.alice, 0, &chain.bob_pk, 10).encode();
            let link = link_tx(&chain.alice, 1, &[("a", "b"), ("a", "c")]).encode();
            let checked_send = app.check_tx(&send);
            let checked_link = app.check_tx(&link);
            assert!(checked_send.is_ok(), "{}", checked_send.log);
            assert!(checked_link.is_ok(), "{}", checked_link.log);

            app.begin_block(header(1)).unwrap();
            let delivered_send = app.deliver_tx(&send);
            let delivered_link = app.deliver_tx(&link);
            assert!(delivered_send.is_ok(), "{}", delivered_send.log);
            assert!(delivered_link.is_ok(), "{}", delivered_link.log);

            // Without links both modes charge the base cost only
            assert_eq!(checked_send.bandwidth, 2);
            assert_eq!(delivered_send.bandwidth, checked_send.bandwidth);

            // Delivery adds the linking cost of the two new edges
            let linking = MessageCostOracle.linking_cost(2, &bandwidth_params());
            assert_eq!(linking, 2);
            assert_eq!(delivered_link.bandwidth, checked_link.bandwidth + linking);
            assert_eq!(
                app.block_bandwidth().0,
                delivered_send.bandwidth + delivered_link.bandwidth
            );
            app.end_block().unwrap();
            app.commit().await.unwrap();
        });
    }

    #[test]
    fn test_governor_resets_every_block() {
        let runner = deterministic::Runner::default();
        runner.start(|_| async move {
            let chain = fixture();
            let mut app = open(Memory::default(), AppConfig::default());
            app.init_chain(&chain.genesis, &[]).unwrap();

            run_block(&mut app, 1, &block_txs(&chain.alice, 1)).await;
            assert_eq!(app.block_bandwidth().0, 3);

            app.begin_block(header(2)).unwrap();
            assert_eq!(app.block_bandwidth().0, 0);
            app.end_block().unwrap();
            app.commit().await.unwrap();
        });
    }

    #[test]
    fn test_unaffordable_links_charge_base_cost() {
        let runner = deterministic::Runner::default();
        runner.start(|_| async move {
            let chain = fixture();
            let mut app = open(Memory::default(), AppConfig::default());
            app.init_chain(&chain.genesis, &[]).unwrap();

            // Bob holds 50 stake, so 50 bandwidth. 60 new edges cost 60 on top of the base 2.
            let (bob, _) = create_account_keypair(2);
            let labels: Vec<(String, String)> = (0..60)
                .map(|i| (format!("s{i}"), format!("t{i}")))
                .collect();
            let links: Vec<(&str, &str)> = labels
                .iter()
                .map(|(from, to)| (from.as_str(), to.as_str()))
                .collect();

            app.begin_block(header(1)).unwrap();
            let response = app.deliver_tx(&link_tx(&bob, 0, &links).encode());
            assert_eq!(response.code, CODE_EXECUTION);
            let response = app.deliver_tx(&send_tx(&bob, 0, &chain.alice_pk, 10).encode());
            assert!(response.is_ok(), "{}", response.log);
            assert_eq!(app.block_bandwidth().0, 4);
            app.end_block().unwrap();
            app.commit().await.unwrap();

            assert_eq!(app.link_count(), 0);
            assert_eq!(app.account(&chain.bob_pk).unwrap().unwrap().balance, 40);
            // 46 left after both charges, clamped to the capacity of the reduced stake
            let bandwidth = app.bandwidth(&chain.bob_pk).unwrap().unwrap();
            assert_eq!(bandwidth.capacity, 40);
            assert_eq!(bandwidth.remaining, 40);
        });
    }

    #[test]
    fn test_tiny_stake_cannot_pay_base_cost() {
        let runner = deterministic::Runner::default();
        runner.start(|_| async move {
            let chain = fixture();
            let doc = genesis_doc(&[(chain.alice_pk.clone(), 1)], &chain.validators);
            let mut app = open(Memory::default(), AppConfig::default());
            app.init_chain(&genesis_json(&doc), &[]).unwrap();

            let tx = link_tx(&chain.alice, 0, &[("a", "b")]).encode();
            assert_eq!(app.check_tx(&tx).code, CODE_NOT_ENOUGH_BANDWIDTH);
            app.begin_block(header(1)).unwrap();
            assert_eq!(app.deliver_tx(&tx).code, CODE_NOT_ENOUGH_BANDWIDTH);
            assert_eq!(app.block_bandwidth().0, 0);
            app.end_block().unwrap();
            app.commit().await.unwrap();
            assert_eq!(app.account(&chain.alice_pk).unwrap().unwrap().nonce, 0);
        });
    }

    #[test]
    fn test_block_limit_rejects_before_execution() {
        let runner = deterministic::Runner::default();
        runner.start(|_| async move {
            let chain = fixture();
            let doc = {
                let mut doc = genesis_doc(&[(chain.alice_pk.clone(), 1_000)], &chain.validators);
                doc.bandwidth.max_block_bandwidth = 4;
                doc
            };
            let mut app = open(Memory::default(), AppConfig::default());
            app.init_chain(&genesis_json(&doc), &[]).unwrap();

            app.begin_block(header(1)).unwrap();
            assert!(app
                .deliver_tx(&link_tx(&chain.alice, 0, &[("a", "b")]).encode())
                .is_ok());
            assert_eq!(app.block_bandwidth(), (3, 4));
            let response = app.deliver_tx(&link_tx(&chain.alice, 1, &[("c", "d")]).encode());
            assert_eq!(response.code, CODE_EXCEEDED_MAX_BLOCK_BANDWIDTH);
            assert_eq!(app.block_bandwidth(), (3, 4));
            app.end_block().unwrap();
            app.commit().await.unwrap();
            assert_eq!(app.account(&chain.alice_pk).unwrap().unwrap().nonce, 1);
        });
    }

    #[test]
    fn test_rank_follows_rounds() {
        let runner = deterministic::Runner::default();
        runner.start(|_| async move {
            let chain = fixture();
            let config = AppConfig {
                allow_search: true,
                ..AppConfig::default()
            };
            let mut app = open(Memory::default(), config);
            app.init_chain(&chain.genesis, &[]).unwrap();

            for height in 1..=4 {
                run_block(&mut app, height, &block_txs(&chain.alice, height)).await;
            }
            assert_eq!(app.rank(&cid("hub")), 0);

            app.begin_block(header(5)).unwrap();
            app.deliver_tx(&block_txs(&chain.alice, 5)[0]);
            let end = app.end_block().unwrap();
            assert!(end
                .events
                .contains(&Event::RankCalculated { height: 5, cids: 6 }));
            app.commit().await.unwrap();

            assert_eq!(app.rank(&cid("hub")), 5);
            assert_eq!(app.search(&cid("n3"), 10).unwrap(), vec![(cid("hub"), 5)]);
        });
    }

    #[test]
    fn test_restart_reproduces_hashes() {
        let runner = deterministic::Runner::default();
        runner.start(|context| async move {
            let chain = fixture();
            let config = AppConfig {
                inv_check_period: 1,
                ..AppConfig::default()
            };

            let mut live = open(Memory::default(), config.clone());
            live.init_chain(&chain.genesis, &[]).unwrap();
            let mut expected = Vec::new();
            for height in 1..=12 {
                expected.push(run_block(&mut live, height, &block_txs(&chain.alice, height)).await);
            }

            // Stop at 3 (before the first round) and at 7 (inside the second)
            let journal = Journal::init(context.with_label("journal_0"), "state")
                .await
                .unwrap();
            let mut app = open(journal, config.clone());
            app.init_chain(&chain.genesis, &[]).unwrap();
            for height in 1..=12 {
                if height == 4 || height == 8 {
                    drop(app);
                    let journal = Journal::init(context.with_label(&format!("journal_{height}")), "state")
                        .await
                        .unwrap();
                    app = open(journal, config.clone());
                    assert_eq!(app.info().last_height, height - 1);
                    assert_eq!(app.info().last_app_hash, expected[height as usize - 2]);
                }
                let hash = run_block(&mut app, height, &block_txs(&chain.alice, height)).await;
                assert_eq!(hash, expected[height as usize - 1], "height {height}");
            }
            assert_eq!(app.rank(&cid("hub")), live.rank(&cid("hub")));
        });
    }

    #[test]
    fn test_history_is_pruned_at_round_boundaries() {
        let runner = deterministic::Runner::default();
        runner.start(|_| async move {
            let chain = fixture();
            let mut app = open(Memory::default(), AppConfig::default());
            app.init_chain(&chain.genesis, &[]).unwrap();

            let scheduler = RoundScheduler::new(NonZeroU64::new(rank_params().calculation_period).unwrap());
            let account = Key::Account(chain.alice_pk.clone());
            for height in 1..=23 {
                run_block(&mut app, height, &block_txs(&chain.alice, height)).await;

                // Alice's account changes every block; only versions since the boundary survive
                let boundary = scheduler.boundary(height);
                assert_eq!(app.store.pruned(), boundary, "height {height}");
                assert_eq!(
                    app.store.versions_of(&account),
                    (height - boundary + 1) as usize,
                    "height {height}"
                );
                assert!(app.store.snapshot(boundary).is_ok());
            }
            assert!(app.store.snapshot(19).is_err());
            assert_eq!(app.account(&chain.alice_pk).unwrap().unwrap().nonce, 23);
        });
    }

    #[test]
    fn test_restart_before_first_commit_reruns_genesis() {
        let runner = deterministic::Runner::default();
        runner.start(|_| async move {
            let chain = fixture();
            let mut app = open(Memory::default(), AppConfig::default());
            app.init_chain(&chain.genesis, &[]).unwrap();
            let store = app.into_store();
            assert_eq!(store.height(), 0);

            let mut app = open(store, AppConfig::default());
            app.init_chain(&chain.genesis, &[]).unwrap();
            run_block(&mut app, 1, &block_txs(&chain.alice, 1)).await;
        });
    }

    #[test]
    fn test_unknown_model_version_is_fatal() {
        let runner = deterministic::Runner::default();
        runner.start(|_| async move {
            let chain = fixture();
            let mut doc = genesis_doc(&[(chain.alice_pk.clone(), 1)], &chain.validators);
            doc.model.version = 9;
            let mut app = open(Memory::default(), AppConfig::default());
            assert!(matches!(
                app.init_chain(&genesis_json(&doc), &[]),
                Err(BlockError::Fatal(FatalError::UnsupportedModel(9)))
            ));
        });
    }
}
