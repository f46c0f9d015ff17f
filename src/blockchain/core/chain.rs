use crate::cache::BlockCache;
use crate::error::{LedgerError, Result};
use crate::miner::ProofOfWork;
use crate::persistence::{Bucket, Persistence};
use crate::transaction::{self, Transaction};
use bincode::Options;
use serde_bytes::ByteBuf;
use sha2::{Digest, Sha256};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tracing::info;

pub type Sha256Hash = [u8; 32];

/// Reserved key holding the hash of the current tip.
pub const TIP_KEY: &[u8] = b"l";

/// Maximum encoded block size in bytes (16MB)
pub const MAX_BLOCK_SIZE: u64 = 16 * 1024 * 1024;

/// A sealed batch of transactions. Fields are fixed at construction; there are no setters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    timestamp: i64,
    transactions: Vec<Transaction>,
    previous_hash: Option<Sha256Hash>,
    hash: Sha256Hash,
    nonce: u64,
}

/// On-disk record layout. Field order is part of the storage format.
#[derive(serde::Serialize, serde::Deserialize)]
struct StoredBlock {
    timestamp: i64,
    transaction_types: Vec<String>,
    transactions: Vec<ByteBuf>,
    #[serde(with = "serde_bytes")]
    previous_hash: Vec<u8>,
    #[serde(with = "serde_bytes")]
    hash: Vec<u8>,
    nonce: u64,
}

fn block_options() -> impl Options {
    bincode::DefaultOptions::new()
        .with_limit(MAX_BLOCK_SIZE)
        .reject_trailing_bytes()
}

fn to_hash(bytes: &[u8], what: &str) -> Result<Sha256Hash> {
    bytes.try_into().map_err(|_| {
        LedgerError::MalformedBlock(format!("{} must be 32 bytes, got {}", what, bytes.len()))
    })
}

impl Block {
    /// Build a candidate on top of `previous_hash` stamped with the current time and seal it.
    pub fn new(
        transactions: Vec<Transaction>,
        previous_hash: Option<Sha256Hash>,
        pow: &ProofOfWork,
    ) -> Result<Self> {
        let timestamp = chrono::Utc::now().timestamp();
        let prev = previous_hash.map(|h| h.to_vec()).unwrap_or_default();
        let seal = pow.run(&prev, timestamp, &transactions)?;

        Ok(Block {
            timestamp,
            transactions,
            previous_hash,
            hash: seal.hash,
            nonce: seal.nonce,
        })
    }

    /// Like [`Block::new`], abandoning the search once `cancel` is set.
    pub fn new_cancellable(
        transactions: Vec<Transaction>,
        previous_hash: Option<Sha256Hash>,
        pow: &ProofOfWork,
        cancel: &AtomicBool,
    ) -> Result<Self> {
        let timestamp = chrono::Utc::now().timestamp();
        let prev = previous_hash.map(|h| h.to_vec()).unwrap_or_default();
        let seal = pow.run_cancellable(&prev, timestamp, &transactions, cancel)?;

        Ok(Block {
            timestamp,
            transactions,
            previous_hash,
            hash: seal.hash,
            nonce: seal.nonce,
        })
    }

    pub fn genesis(pow: &ProofOfWork) -> Result<Self> {
        Self::new(vec![Transaction::genesis()], None, pow)
    }

    /// Reassemble a block from stored parts without sealing.
    pub(crate) fn from_parts(
        timestamp: i64,
        transactions: Vec<Transaction>,
        previous_hash: Option<Sha256Hash>,
        hash: Sha256Hash,
        nonce: u64,
    ) -> Self {
        Block {
            timestamp,
            transactions,
            previous_hash,
            hash,
            nonce,
        }
    }

    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    pub fn transactions(&self) -> &[Transaction] {
        &self.transactions
    }

    /// `None` only for the genesis block.
    pub fn previous_hash(&self) -> Option<&Sha256Hash> {
        self.previous_hash.as_ref()
    }

    pub fn hash(&self) -> &Sha256Hash {
        &self.hash
    }

    pub fn nonce(&self) -> u64 {
        self.nonce
    }

    pub fn is_genesis(&self) -> bool {
        self.previous_hash.is_none()
    }

    pub fn transaction_types(&self) -> Vec<&'static str> {
        self.transactions.iter().map(|tx| tx.kind().as_str()).collect()
    }

    /// Canonical pre-image: predecessor hash bytes, decimal timestamp, decimal nonce,
    /// then every transaction payload in order.
    pub fn prepare_data(&self) -> Result<Vec<u8>> {
        let mut data = Vec::new();
        if let Some(prev) = &self.previous_hash {
            data.extend_from_slice(prev);
        }
        data.extend_from_slice(self.timestamp.to_string().as_bytes());
        data.extend_from_slice(self.nonce.to_string().as_bytes());
        for tx in &self.transactions {
            data.extend_from_slice(&transaction::encode(tx)?);
        }
        Ok(data)
    }

    pub fn compute_hash(&self) -> Result<Sha256Hash> {
        Ok(Sha256::digest(self.prepare_data()?).into())
    }

    pub fn serialize(&self) -> Result<Vec<u8>> {
        let mut types = Vec::with_capacity(self.transactions.len());
        let mut payloads = Vec::with_capacity(self.transactions.len());
        for tx in &self.transactions {
            types.push(tx.kind().as_str().to_string());
            payloads.push(ByteBuf::from(transaction::encode(tx)?));
        }

        let stored = StoredBlock {
            timestamp: self.timestamp,
            transaction_types: types,
            transactions: payloads,
            previous_hash: self.previous_hash.map(|h| h.to_vec()).unwrap_or_default(),
            hash: self.hash.to_vec(),
            nonce: self.nonce,
        };
        block_options()
            .serialize(&stored)
            .map_err(|e| LedgerError::MalformedBlock(format!("Failed to encode block: {}", e)))
    }

    pub fn deserialize(data: &[u8]) -> Result<Self> {
        let stored: StoredBlock = block_options()
            .deserialize(data)
            .map_err(|e| LedgerError::MalformedBlock(format!("Failed to decode block: {}", e)))?;

        if stored.transaction_types.len() != stored.transactions.len() {
            return Err(LedgerError::MalformedBlock(format!(
                "{} kind tags for {} payloads",
                stored.transaction_types.len(),
                stored.transactions.len()
            )));
        }

        let transactions = stored
            .transaction_types
            .iter()
            .zip(&stored.transactions)
            .map(|(tag, payload)| transaction::decode(tag, payload))
            .collect::<Result<Vec<_>>>()?;

        let previous_hash = if stored.previous_hash.is_empty() {
            None
        } else {
            Some(to_hash(&stored.previous_hash, "previous hash")?)
        };

        let hash = to_hash(&stored.hash, "block hash")?;
        Ok(Block::from_parts(
            stored.timestamp,
            transactions,
            previous_hash,
            hash,
            stored.nonce,
        ))
    }
}

/// Read access to blocks by hash plus the tip pointer.
pub trait BlockSource {
    fn tip_hash(&self) -> Result<Option<Sha256Hash>>;
    fn block(&self, hash: &Sha256Hash) -> Result<Option<Arc<Block>>>;
}

fn decode_tip(raw: Option<Vec<u8>>) -> Result<Option<Sha256Hash>> {
    match raw {
        None => Ok(None),
        Some(bytes) => bytes.as_slice().try_into().map(Some).map_err(|_| {
            LedgerError::ChainCorruption(format!("tip pointer has {} bytes", bytes.len()))
        }),
    }
}

/// A stored record is only trusted when its contents hash to the key it sits under,
/// which also rules out a block naming itself as predecessor.
fn decode_stored(key: &Sha256Hash, bytes: &[u8]) -> Result<Block> {
    let block = Block::deserialize(bytes)?;
    if block.hash() != key {
        return Err(LedgerError::ChainCorruption(format!(
            "block stored under {} claims hash {}",
            hex::encode(key),
            hex::encode(block.hash())
        )));
    }
    let computed = block.compute_hash()?;
    if computed != *key {
        return Err(LedgerError::ChainCorruption(format!(
            "block stored under {} hashes to {}",
            hex::encode(key),
            hex::encode(computed)
        )));
    }
    Ok(block)
}

fn resolve_tip(source: &dyn BlockSource, tip: &Sha256Hash) -> Result<Arc<Block>> {
    source.block(tip)?.ok_or_else(|| {
        LedgerError::ChainCorruption(format!(
            "tip {} does not name a stored block",
            hex::encode(tip)
        ))
    })
}

/// The chain as seen from inside an open unit of work.
struct BucketSource<'b> {
    bucket: &'b dyn Bucket,
}

impl BlockSource for BucketSource<'_> {
    fn tip_hash(&self) -> Result<Option<Sha256Hash>> {
        decode_tip(self.bucket.get(TIP_KEY)?)
    }

    fn block(&self, hash: &Sha256Hash) -> Result<Option<Arc<Block>>> {
        match self.bucket.get(hash)? {
            Some(bytes) => Ok(Some(Arc::new(decode_stored(hash, &bytes)?))),
            None => Ok(None),
        }
    }
}

/// Walks from a starting hash back to genesis, newest first.
pub struct BlockchainIterator<'a> {
    source: &'a dyn BlockSource,
    current_hash: Option<Sha256Hash>,
}

impl<'a> BlockchainIterator<'a> {
    /// Positioned at the source's tip as of this call.
    pub fn new(source: &'a dyn BlockSource) -> Result<Self> {
        Ok(Self {
            source,
            current_hash: source.tip_hash()?,
        })
    }
}

impl Iterator for BlockchainIterator<'_> {
    type Item = Result<Arc<Block>>;

    fn next(&mut self) -> Option<Self::Item> {
        // Taking the hash first means an error ends the walk instead of repeating.
        let hash = self.current_hash.take()?;
        match self.source.block(&hash) {
            Ok(Some(block)) => {
                self.current_hash = block.previous_hash().copied();
                Some(Ok(block))
            }
            Ok(None) => Some(Err(LedgerError::ChainCorruption(format!(
                "block {} is referenced by the chain but missing from the store",
                hex::encode(hash)
            )))),
            Err(e) => Some(Err(e)),
        }
    }
}

/// Append-only ledger over a key-value bucket: blocks keyed by hash, tip under `l`.
pub struct Blockchain {
    persistence: Box<dyn Persistence>,
    pow: ProofOfWork,
    cache: BlockCache,
}

impl Blockchain {
    /// Open the ledger, creating and persisting a genesis block if the store is empty.
    pub fn open(persistence: Box<dyn Persistence>, pow: ProofOfWork) -> Result<Self> {
        Self::open_with_cache(persistence, pow, BlockCache::DEFAULT_CAPACITY)
    }

    pub fn open_with_cache(
        persistence: Box<dyn Persistence>,
        pow: ProofOfWork,
        cache_capacity: usize,
    ) -> Result<Self> {
        let mut created: Option<Sha256Hash> = None;
        persistence.update(&mut |bucket: &mut dyn Bucket| {
            if let Some(tip) = decode_tip(bucket.get(TIP_KEY)?)? {
                return resolve_tip(&BucketSource { bucket: &*bucket }, &tip).map(|_| ());
            }
            let genesis = Block::genesis(&pow)?;
            bucket.put(genesis.hash(), &genesis.serialize()?)?;
            bucket.put(TIP_KEY, genesis.hash())?;
            created = Some(*genesis.hash());
            Ok(())
        })?;

        if let Some(hash) = created {
            info!(genesis = %hex::encode(hash), "No existing blockchain found, created a new one");
        }

        Ok(Blockchain {
            persistence,
            pow,
            cache: BlockCache::new(cache_capacity),
        })
    }

    pub fn pow(&self) -> &ProofOfWork {
        &self.pow
    }

    pub fn tip(&self) -> Result<Sha256Hash> {
        self.tip_hash()?
            .ok_or_else(|| LedgerError::ChainCorruption("tip pointer is missing".to_string()))
    }

    pub fn get(&self, hash: &Sha256Hash) -> Result<Arc<Block>> {
        self.block(hash)?
            .ok_or_else(|| LedgerError::BlockNotFound(hex::encode(hash)))
    }

    pub fn iter(&self) -> Result<BlockchainIterator<'_>> {
        BlockchainIterator::new(self)
    }

    /// Seal `transactions` on top of the current tip and advance the tip, atomically.
    pub fn append(&self, transactions: Vec<Transaction>) -> Result<Arc<Block>> {
        self.append_with(transactions, &|_: &dyn BlockSource| Ok(()))
    }

    /// Like [`append`](Self::append), running `admit` against the chain inside the same
    /// unit of work first. An `admit` error aborts the append with nothing written.
    pub fn append_with(
        &self,
        transactions: Vec<Transaction>,
        admit: &dyn Fn(&dyn BlockSource) -> Result<()>,
    ) -> Result<Arc<Block>> {
        if transactions.is_empty() {
            return Err(LedgerError::InvalidTransaction(
                "a block needs at least one transaction".to_string(),
            ));
        }
        if transactions.iter().any(|tx| matches!(tx, Transaction::Genesis(_))) {
            return Err(LedgerError::InvalidTransaction(
                "genesis transactions only appear in the genesis block".to_string(),
            ));
        }

        let mut sealed: Option<Block> = None;
        self.persistence.update(&mut |bucket: &mut dyn Bucket| {
            let tip = {
                let view = BucketSource { bucket: &*bucket };
                admit(&view)?;
                let tip = view.tip_hash()?.ok_or_else(|| {
                    LedgerError::ChainCorruption("tip pointer is missing".to_string())
                })?;
                resolve_tip(&view, &tip)?;
                tip
            };

            let block = Block::new(transactions.clone(), Some(tip), &self.pow)?;
            bucket.put(block.hash(), &block.serialize()?)?;
            bucket.put(TIP_KEY, block.hash())?;
            sealed = Some(block);
            Ok(())
        })?;

        let block = Arc::new(sealed.ok_or_else(|| {
            LedgerError::Database("unit of work committed without a block".to_string())
        })?);
        self.cache.put(*block.hash(), block.clone());

        info!(
            hash = %hex::encode(block.hash()),
            nonce = block.nonce(),
            transactions = block.transactions().len(),
            "Appended block"
        );
        Ok(block)
    }

    /// Persist a block confirmed elsewhere and make it the tip, without sealing it again.
    /// Existing block bytes are never overwritten.
    pub fn accept_block(&self, block: &Block) -> Result<()> {
        if block.compute_hash()? != *block.hash() {
            return Err(LedgerError::MalformedBlock(format!(
                "block {} does not hash to its stated hash",
                hex::encode(block.hash())
            )));
        }
        let encoded = block.serialize()?;

        self.persistence.update(&mut |bucket: &mut dyn Bucket| {
            match block.previous_hash() {
                Some(prev) => {
                    if bucket.get(prev)?.is_none() {
                        return Err(LedgerError::ChainCorruption(format!(
                            "predecessor {} of block {} is not in the store",
                            hex::encode(prev),
                            hex::encode(block.hash())
                        )));
                    }
                }
                None => {
                    if bucket.get(TIP_KEY)?.is_some() {
                        return Err(LedgerError::ChainCorruption(
                            "refusing a second genesis block".to_string(),
                        ));
                    }
                }
            }

            if bucket.get(block.hash())?.is_none() {
                bucket.put(block.hash(), &encoded)?;
            }
            bucket.put(TIP_KEY, block.hash())
        })?;

        info!(hash = %hex::encode(block.hash()), "Accepted confirmed block as tip");
        Ok(())
    }
}

impl BlockSource for Blockchain {
    fn tip_hash(&self) -> Result<Option<Sha256Hash>> {
        decode_tip(self.persistence.get(TIP_KEY)?)
    }

    fn block(&self, hash: &Sha256Hash) -> Result<Option<Arc<Block>>> {
        if let Some(block) = self.cache.get(hash) {
            return Ok(Some(block));
        }
        match self.persistence.get(hash)? {
            Some(bytes) => {
                let block = Arc::new(decode_stored(hash, &bytes)?);
                self.cache.put(*hash, block.clone());
                Ok(Some(block))
            }
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::InMemoryPersistence;
    use crate::transaction::{LoanContract, VehicleRegistration};

    fn pow() -> ProofOfWork {
        ProofOfWork::new(8).unwrap()
    }

    fn registration(vin: &str, owner: &str) -> Transaction {
        Transaction::VehicleRegistration(VehicleRegistration {
            vin: vin.to_string(),
            owner: owner.as_bytes().to_vec(),
            registration_date: 1_700_000_000,
        })
    }

    fn sealed() -> Block {
        let loan = Transaction::LoanContract(LoanContract {
            vin: "V1".to_string(),
            borrower: b"Alice".to_vec(),
            lender: b"Bank".to_vec(),
            loan_amount: 1000,
            start_date: 1_700_000_000,
            end_date: 1_800_000_000,
        });
        Block::new(vec![registration("V1", "Alice"), loan], Some([9u8; 32]), &pow()).unwrap()
    }

    #[test]
    fn test_sealed_block_validates() {
        let block = sealed();
        assert!(pow().validate(&block));
        assert_eq!(block.compute_hash().unwrap(), *block.hash());
    }

    #[test]
    fn test_tampering_any_field_invalidates() {
        let pow = pow();
        let block = sealed();

        let mut b = block.clone();
        b.timestamp += 1;
        assert!(!pow.validate(&b));

        let mut b = block.clone();
        b.nonce += 1;
        assert!(!pow.validate(&b));

        let mut b = block.clone();
        b.transactions[0] = registration("V1", "Mallory");
        assert!(!pow.validate(&b));

        let mut b = block.clone();
        b.previous_hash = Some([8u8; 32]);
        assert!(!pow.validate(&b));

        let mut b = block;
        b.previous_hash = None;
        assert!(!pow.validate(&b));
    }

    #[test]
    fn test_prepare_data_layout() {
        let block = Block::from_parts(1234, vec![Transaction::genesis()], Some([1u8; 32]), [0u8; 32], 56);
        let mut expected = vec![1u8; 32];
        expected.extend_from_slice(b"1234");
        expected.extend_from_slice(b"56");
        expected.extend_from_slice(&transaction::encode(&Transaction::genesis()).unwrap());
        assert_eq!(block.prepare_data().unwrap(), expected);

        // Genesis contributes no predecessor bytes.
        let genesis = Block::from_parts(1234, vec![Transaction::genesis()], None, [0u8; 32], 56);
        assert_eq!(genesis.prepare_data().unwrap(), expected[32..].to_vec());
    }

    #[test]
    fn test_serialize_preserves_every_field() {
        let block = sealed();
        let decoded = Block::deserialize(&block.serialize().unwrap()).unwrap();
        assert_eq!(decoded, block);
        assert_eq!(decoded.transaction_types(), vec!["VehicleRegistration", "LoanContract"]);

        let genesis = Block::genesis(&pow()).unwrap();
        let decoded = Block::deserialize(&genesis.serialize().unwrap()).unwrap();
        assert!(decoded.is_genesis());
        assert_eq!(decoded, genesis);
    }

    fn stored(types: Vec<&str>, payloads: Vec<Vec<u8>>) -> Vec<u8> {
        let stored = StoredBlock {
            timestamp: 1,
            transaction_types: types.into_iter().map(String::from).collect(),
            transactions: payloads.into_iter().map(ByteBuf::from).collect(),
            previous_hash: Vec::new(),
            hash: vec![0u8; 32],
            nonce: 0,
        };
        block_options().serialize(&stored).unwrap()
    }

    #[test]
    fn test_deserialize_rejects_tag_payload_mismatch() {
        let payload = transaction::encode(&Transaction::genesis()).unwrap();
        let bytes = stored(vec!["genesis", "genesis"], vec![payload]);
        assert!(matches!(Block::deserialize(&bytes), Err(LedgerError::MalformedBlock(_))));
    }

    #[test]
    fn test_deserialize_rejects_unknown_tag() {
        let payload = transaction::encode(&Transaction::genesis()).unwrap();
        let bytes = stored(vec!["Bogus"], vec![payload]);
        assert!(matches!(
            Block::deserialize(&bytes),
            Err(LedgerError::UnknownTransactionKind(_))
        ));
    }

    #[test]
    fn test_deserialize_rejects_short_hash() {
        let mut record = StoredBlock {
            timestamp: 1,
            transaction_types: vec![],
            transactions: vec![],
            previous_hash: vec![1, 2, 3],
            hash: vec![0u8; 32],
            nonce: 0,
        };
        let bytes = block_options().serialize(&record).unwrap();
        assert!(matches!(Block::deserialize(&bytes), Err(LedgerError::MalformedBlock(_))));

        record.previous_hash = Vec::new();
        record.hash = vec![0u8; 31];
        let bytes = block_options().serialize(&record).unwrap();
        assert!(matches!(Block::deserialize(&bytes), Err(LedgerError::MalformedBlock(_))));
    }

    #[test]
    fn test_cancelled_seal() {
        let cancel = AtomicBool::new(true);
        let hard = ProofOfWork::new(64).unwrap();
        assert!(matches!(
            Block::new_cancellable(vec![Transaction::genesis()], None, &hard, &cancel),
            Err(LedgerError::SealSearchCancelled)
        ));
    }

    #[test]
    fn test_open_writes_genesis_once() {
        let store = InMemoryPersistence::new();
        let chain = Blockchain::open(Box::new(store.clone()), pow()).unwrap();
        let tip = chain.tip().unwrap();
        assert!(chain.get(&tip).unwrap().is_genesis());
        assert_eq!(store.len(), 2);

        let reopened = Blockchain::open(Box::new(store.clone()), pow()).unwrap();
        assert_eq!(reopened.tip().unwrap(), tip);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_rejected_admission_writes_nothing() {
        let store = InMemoryPersistence::new();
        let chain = Blockchain::open(Box::new(store.clone()), pow()).unwrap();
        let tip = chain.tip().unwrap();

        let result = chain.append_with(vec![registration("V9", "Zed")], &|_: &dyn BlockSource| {
            Err(LedgerError::ActiveLoan("V9".to_string()))
        });
        assert!(matches!(result, Err(LedgerError::ActiveLoan(_))));
        assert_eq!(chain.tip().unwrap(), tip);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_append_rejects_empty_and_genesis_batches() {
        let chain = Blockchain::open(Box::new(InMemoryPersistence::new()), pow()).unwrap();
        assert!(matches!(chain.append(vec![]), Err(LedgerError::InvalidTransaction(_))));
        assert!(matches!(
            chain.append(vec![Transaction::genesis()]),
            Err(LedgerError::InvalidTransaction(_))
        ));
    }

    #[test]
    fn test_block_under_wrong_key_is_corruption() {
        let store = InMemoryPersistence::new();
        let chain = Blockchain::open(Box::new(store.clone()), pow()).unwrap();
        let genesis = chain.get(&chain.tip().unwrap()).unwrap();
        let bogus_key = [0xAB; 32];
        store
            .update(&mut |bucket: &mut dyn Bucket| bucket.put(&bogus_key, &genesis.serialize()?))
            .unwrap();
        assert!(matches!(chain.get(&bogus_key), Err(LedgerError::ChainCorruption(_))));
    }

    #[test]
    fn test_self_referencing_record_is_corruption() {
        let store = InMemoryPersistence::new();
        let chain = Blockchain::open(Box::new(store.clone()), pow()).unwrap();
        let key = [0x5A; 32];
        let looped = Block::from_parts(1, vec![Transaction::genesis()], Some(key), key, 0);
        store
            .update(&mut |bucket: &mut dyn Bucket| {
                bucket.put(&key, &looped.serialize()?)?;
                bucket.put(TIP_KEY, &key)
            })
            .unwrap();

        assert!(matches!(chain.get(&key), Err(LedgerError::ChainCorruption(_))));
        let mut walk = chain.iter().unwrap();
        assert!(matches!(walk.next(), Some(Err(LedgerError::ChainCorruption(_)))));
        assert!(walk.next().is_none());
        assert!(matches!(
            chain.latest_owner("nobody"),
            Err(LedgerError::ChainCorruption(_))
        ));
        assert!(matches!(
            chain.has_active_loan("nobody", 0),
            Err(LedgerError::ChainCorruption(_))
        ));
    }

    #[test]
    fn test_stored_contents_must_hash_to_key() {
        let store = InMemoryPersistence::new();
        let chain = Blockchain::open(Box::new(store.clone()), pow()).unwrap();
        let block = sealed();
        let forged = Block::from_parts(
            block.timestamp(),
            vec![registration("V1", "Mallory")],
            block.previous_hash().copied(),
            *block.hash(),
            block.nonce(),
        );
        store
            .update(&mut |bucket: &mut dyn Bucket| bucket.put(block.hash(), &forged.serialize()?))
            .unwrap();
        assert!(matches!(chain.get(block.hash()), Err(LedgerError::ChainCorruption(_))));
    }

    #[test]
    fn test_append_refuses_dangling_tip() {
        let store = InMemoryPersistence::new();
        let chain = Blockchain::open(Box::new(store.clone()), pow()).unwrap();
        store
            .update(&mut |bucket: &mut dyn Bucket| bucket.put(TIP_KEY, &[0x42; 32]))
            .unwrap();
        let before = store.len();

        assert!(matches!(
            chain.append(vec![registration("V1", "Alice")]),
            Err(LedgerError::ChainCorruption(_))
        ));
        assert_eq!(store.len(), before);
        assert_eq!(chain.tip().unwrap(), [0x42; 32]);
    }

    #[test]
    fn test_open_refuses_dangling_tip() {
        let store = InMemoryPersistence::new();
        store
            .update(&mut |bucket: &mut dyn Bucket| bucket.put(TIP_KEY, &[0x42; 32]))
            .unwrap();

        let err = Blockchain::open(Box::new(store.clone()), pow()).err().unwrap();
        assert!(matches!(err, LedgerError::ChainCorruption(_)));
        assert!(err.is_fatal());
        assert_eq!(store.len(), 1);
    }
}
