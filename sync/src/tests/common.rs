use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use containers::{Block, BlockHeader, Bytes32, Height, RawBlock, TempBlock, Transaction, TransactionId};
use libp2p_identity::PeerId;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use tokio::sync::Notify;

use crate::schema::ValidationErrors;
use crate::synchronizer::SynchronizerBuilder;
use crate::types::{
    AddTransactionResult, ChainDataAccess, DeleteOptions, NetworkChannel, NetworkResponse,
    ProcessOptions, Processor, TransactionPool,
};
use crate::Mechanism;

/// Every collaborator call the in-memory chain saw, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Deserialize,
    Validate(Height),
    ProcessValidated {
        height: Height,
        remove_from_temp_table: bool,
    },
    DeleteLastBlock {
        save_temp_block: bool,
    },
    IsTempBlockEmpty,
    GetTempBlocks,
    ClearTempBlocks,
    GetLastBlock,
    GetHeadersBetween(Height, Height),
    GetHeaderByHeight(Height),
}

impl Call {
    pub fn is_mutation(&self) -> bool {
        matches!(
            self,
            Call::ProcessValidated { .. } | Call::DeleteLastBlock { .. } | Call::ClearTempBlocks
        )
    }
}

#[derive(Default)]
struct ChainInner {
    blocks: Vec<Block>,
    temp: Vec<TempBlock>,
    calls: Vec<Call>,
    fail_process_at: Option<Height>,
    reject_validation: bool,
    fail_tip_reads: bool,
    stall_next_temp_check: bool,
}

/// Canonical chain and temporary table kept in memory. Acts as both processor and
/// data access, like the node's chain module does.
#[derive(Default)]
pub struct MemoryChain {
    inner: Mutex<ChainInner>,
}

impl MemoryChain {
    pub fn new(blocks: Vec<Block>) -> Self {
        Self {
            inner: Mutex::new(ChainInner {
                blocks,
                ..Default::default()
            }),
        }
    }

    pub fn with_temp_blocks(self, temp: Vec<Block>) -> Self {
        self.inner.lock().temp = temp.into_iter().map(TempBlock::from).collect();
        self
    }

    pub fn fail_process_at(self, height: Height) -> Self {
        self.inner.lock().fail_process_at = Some(height);
        self
    }

    pub fn reject_validation(self) -> Self {
        self.inner.lock().reject_validation = true;
        self
    }

    pub fn fail_tip_reads(self) -> Self {
        self.inner.lock().fail_tip_reads = true;
        self
    }

    /// The next temp table check never completes.
    pub fn stall_next_temp_check(self) -> Self {
        self.inner.lock().stall_next_temp_check = true;
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.inner.lock().calls.clone()
    }

    pub fn count(&self, predicate: impl Fn(&Call) -> bool) -> usize {
        self.inner.lock().calls.iter().filter(|call| predicate(call)).count()
    }

    pub fn mutations(&self) -> Vec<Call> {
        self.calls().into_iter().filter(Call::is_mutation).collect()
    }

    pub fn tip(&self) -> Block {
        self.inner.lock().blocks.last().cloned().expect("chain is never empty in tests")
    }

    pub fn heights(&self) -> Vec<u64> {
        self.inner.lock().blocks.iter().map(|b| b.height().0).collect()
    }

    pub fn temp_blocks(&self) -> Vec<TempBlock> {
        self.inner.lock().temp.clone()
    }

    fn record(&self, call: Call) {
        self.inner.lock().calls.push(call);
    }
}

#[async_trait]
impl Processor for MemoryChain {
    async fn deserialize(&self, raw: &RawBlock) -> Result<Block> {
        self.record(Call::Deserialize);
        Ok(serde_json::from_value(raw.clone())?)
    }

    async fn validate(&self, block: &Block) -> std::result::Result<(), ValidationErrors> {
        self.record(Call::Validate(block.height()));
        if self.inner.lock().reject_validation {
            return Err(ValidationErrors::single("version", "unsupported block version"));
        }
        Ok(())
    }

    async fn process_validated(&self, block: &Block, options: ProcessOptions) -> Result<()> {
        self.record(Call::ProcessValidated {
            height: block.height(),
            remove_from_temp_table: options.remove_from_temp_table,
        });

        let mut inner = self.inner.lock();
        if inner.fail_process_at == Some(block.height()) {
            bail!("state transition failed at height {}", block.height());
        }
        let tip = inner.blocks.last().ok_or_else(|| anyhow!("empty chain"))?;
        if block.previous_block_id() != tip.id() {
            bail!("block {} does not extend tip {}", block.id(), tip.id());
        }
        inner.blocks.push(block.clone());
        if options.remove_from_temp_table {
            inner.temp.retain(|entry| entry.id != block.id());
        }
        Ok(())
    }

    async fn delete_last_block(&self, options: DeleteOptions) -> Result<BlockHeader> {
        self.record(Call::DeleteLastBlock {
            save_temp_block: options.save_temp_block,
        });

        let mut inner = self.inner.lock();
        if inner.blocks.len() < 2 {
            bail!("cannot delete genesis");
        }
        let deleted = inner.blocks.pop().ok_or_else(|| anyhow!("empty chain"))?;
        if options.save_temp_block {
            inner.temp.push(TempBlock::from(deleted));
        }
        let tip = inner.blocks.last().ok_or_else(|| anyhow!("empty chain"))?;
        Ok(tip.header.clone())
    }
}

#[async_trait]
impl ChainDataAccess for MemoryChain {
    async fn is_temp_block_empty(&self) -> Result<bool> {
        self.record(Call::IsTempBlockEmpty);
        let stall = std::mem::take(&mut self.inner.lock().stall_next_temp_check);
        if stall {
            std::future::pending::<()>().await;
        }
        Ok(self.inner.lock().temp.is_empty())
    }

    async fn get_temp_blocks(&self) -> Result<Vec<TempBlock>> {
        self.record(Call::GetTempBlocks);
        Ok(self.inner.lock().temp.clone())
    }

    async fn clear_temp_blocks(&self) -> Result<()> {
        self.record(Call::ClearTempBlocks);
        self.inner.lock().temp.clear();
        Ok(())
    }

    async fn get_last_block(&self) -> Result<Block> {
        self.record(Call::GetLastBlock);
        let inner = self.inner.lock();
        if inner.fail_tip_reads {
            bail!("chain database unavailable");
        }
        inner
            .blocks
            .last()
            .cloned()
            .ok_or_else(|| anyhow!("empty chain"))
    }

    async fn get_block_headers_by_height_between(
        &self,
        low: Height,
        high: Height,
    ) -> Result<Vec<BlockHeader>> {
        self.record(Call::GetHeadersBetween(low, high));
        Ok(self
            .inner
            .lock()
            .blocks
            .iter()
            .filter(|b| b.height() >= low && b.height() <= high)
            .map(|b| b.header.clone())
            .collect())
    }

    async fn get_block_header_by_height(&self, height: Height) -> Result<Option<BlockHeader>> {
        self.record(Call::GetHeaderByHeight(height));
        Ok(self
            .inner
            .lock()
            .blocks
            .iter()
            .find(|b| b.height() == height)
            .map(|b| b.header.clone()))
    }
}

pub fn genesis() -> Block {
    Block::new(Height::GENESIS, Bytes32::ZERO, 2, 0, Height::GENESIS, vec![])
}

/// `count` blocks on top of `parent`. `branch` keeps sibling branches apart.
pub fn extend(parent: &Block, count: usize, branch: u8) -> Vec<Block> {
    let mut blocks = Vec::with_capacity(count);
    let mut previous = parent.clone();
    for _ in 0..count {
        let height = previous.height().child();
        let block = Block::new(
            height,
            previous.id(),
            2,
            height.0 * 10,
            Height::GENESIS,
            vec![branch, height.0 as u8],
        );
        blocks.push(block.clone());
        previous = block;
    }
    blocks
}

/// Genesis plus blocks up to `tip`.
pub fn canonical_chain(tip: u64) -> Vec<Block> {
    let genesis = genesis();
    let mut blocks = vec![genesis.clone()];
    blocks.extend(extend(&genesis, tip as usize, 0));
    blocks
}

pub fn raw(block: &Block) -> RawBlock {
    serde_json::to_value(block).expect("blocks serialize")
}

/// Peer responses scripted per procedure, served in order.
#[derive(Default)]
pub struct FakeNetwork {
    responses: Mutex<HashMap<String, VecDeque<Value>>>,
    requests: Mutex<Vec<(String, Option<PeerId>, Value)>>,
    responder: Option<PeerId>,
}

impl FakeNetwork {
    pub fn new() -> Self {
        Self {
            responder: Some(PeerId::random()),
            ..Default::default()
        }
    }

    pub fn respond(&self, procedure: &str, data: Value) {
        self.responses
            .lock()
            .entry(procedure.to_string())
            .or_default()
            .push_back(data);
    }

    pub fn requests(&self) -> Vec<(String, Option<PeerId>, Value)> {
        self.requests.lock().clone()
    }

    pub fn requests_for(&self, procedure: &str) -> Vec<Value> {
        self.requests
            .lock()
            .iter()
            .filter(|(name, _, _)| name == procedure)
            .map(|(_, _, params)| params.clone())
            .collect()
    }
}

#[async_trait]
impl NetworkChannel for FakeNetwork {
    async fn invoke_from_network(
        &self,
        procedure: &str,
        peer_id: Option<&PeerId>,
        params: Value,
    ) -> Result<NetworkResponse> {
        self.requests
            .lock()
            .push((procedure.to_string(), peer_id.copied(), params));

        let data = self
            .responses
            .lock()
            .get_mut(procedure)
            .and_then(VecDeque::pop_front)
            .ok_or_else(|| anyhow!("no response from peer for {procedure}"))?;

        Ok(NetworkResponse {
            peer_id: peer_id.copied().or(self.responder),
            data,
        })
    }
}

/// Pool that accepts everything except the configured ids.
#[derive(Default)]
pub struct FakePool {
    rejected_ids: HashSet<TransactionId>,
    added: Mutex<Vec<Transaction>>,
}

impl FakePool {
    pub fn rejecting(ids: impl IntoIterator<Item = TransactionId>) -> Self {
        Self {
            rejected_ids: ids.into_iter().collect(),
            added: Mutex::new(Vec::new()),
        }
    }

    pub fn added(&self) -> Vec<Transaction> {
        self.added.lock().clone()
    }
}

#[async_trait]
impl TransactionPool for FakePool {
    async fn add(&self, transaction: Transaction) -> AddTransactionResult {
        let rejected = self.rejected_ids.contains(&transaction.id);
        self.added.lock().push(transaction);
        if rejected {
            AddTransactionResult::fail(vec!["nonce already used".to_string()])
        } else {
            AddTransactionResult::ok()
        }
    }
}

type Predicate = Box<dyn Fn(&Block) -> bool + Send + Sync>;

/// Mechanism recording its calls. Optionally parks inside `run` until released.
pub struct FakeMechanism {
    name: String,
    predicate: Predicate,
    failure: Option<String>,
    gated: bool,
    pub started: Notify,
    pub release: Notify,
    validity_checks: Mutex<Vec<Height>>,
    runs: Mutex<Vec<(Block, PeerId)>>,
}

impl FakeMechanism {
    pub fn new(name: &str, valid: bool) -> Self {
        Self::matching(name, move |_| valid)
    }

    pub fn matching(name: &str, predicate: impl Fn(&Block) -> bool + Send + Sync + 'static) -> Self {
        Self {
            name: name.to_string(),
            predicate: Box::new(predicate),
            failure: None,
            gated: false,
            started: Notify::new(),
            release: Notify::new(),
            validity_checks: Mutex::new(Vec::new()),
            runs: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(mut self, message: &str) -> Self {
        self.failure = Some(message.to_string());
        self
    }

    pub fn gated(mut self) -> Self {
        self.gated = true;
        self
    }

    pub fn validity_checks(&self) -> usize {
        self.validity_checks.lock().len()
    }

    pub fn runs(&self) -> Vec<(Block, PeerId)> {
        self.runs.lock().clone()
    }
}

#[async_trait]
impl Mechanism for FakeMechanism {
    fn name(&self) -> &str {
        &self.name
    }

    async fn is_valid_for(&self, block: &Block) -> Result<bool> {
        self.validity_checks.lock().push(block.height());
        Ok((self.predicate)(block))
    }

    async fn run(&self, block: &Block, peer_id: &PeerId) -> Result<()> {
        self.runs.lock().push((block.clone(), *peer_id));
        if self.gated {
            self.started.notify_one();
            self.release.notified().await;
        }
        match &self.failure {
            Some(message) => bail!("{message}"),
            None => Ok(()),
        }
    }
}

/// Collaborators shared between a synchronizer under test and the assertions.
pub struct Harness {
    pub chain: Arc<MemoryChain>,
    pub network: Arc<FakeNetwork>,
    pub pool: Arc<FakePool>,
}

impl Harness {
    pub fn new(chain: MemoryChain) -> Self {
        Self::with_pool(chain, FakePool::default())
    }

    pub fn with_pool(chain: MemoryChain, pool: FakePool) -> Self {
        Self {
            chain: Arc::new(chain),
            network: Arc::new(FakeNetwork::new()),
            pool: Arc::new(pool),
        }
    }

    pub fn builder(&self) -> SynchronizerBuilder {
        SynchronizerBuilder::new(
            self.chain.clone(),
            self.chain.clone(),
            self.network.clone(),
            self.pool.clone(),
        )
    }
}
