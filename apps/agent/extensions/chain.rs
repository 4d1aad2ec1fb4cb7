use crate::{duration::ClockMode, status::RawStatus};
use alloy::{
    contract::Error as ContractError,
    eips::BlockNumberOrTag,
    primitives::{Address, U256},
    providers::{DynProvider, Provider, ProviderBuilder},
    signers::local::PrivateKeySigner,
    sol,
};
use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use std::{
    collections::HashMap,
    sync::Mutex,
    time::{Duration, Instant},
};
use tracing::{debug, info, instrument, warn};

sol!(
    #[allow(missing_docs)]
    #[sol(rpc)]
    interface IGovernor {
        function state(uint256 proposalId) external view returns (uint8);
        function CLOCK_MODE() external view returns (string memory);
        function castVoteWithReason(uint256 proposalId, uint8 support, string calldata reason) external returns (uint256);
    }
);

/// Blocks sampled when measuring the average block interval.
const BLOCK_INTERVAL_SAMPLE: u64 = 1_000;
const BLOCK_INTERVAL_TTL: Duration = Duration::from_secs(60 * 60);

#[async_trait]
pub trait GovernorChain: Send + Sync {
    async fn status(&self, governor: Address, proposal_id: &str) -> Result<RawStatus>;

    async fn clock_mode(&self, governor: Address) -> Result<ClockMode>;

    /// Average seconds per block, measured from recent history.
    async fn block_interval(&self) -> Result<f64>;

    /// Returns the transaction hash once the vote is mined successfully.
    async fn cast_vote_with_reason(&self, governor: Address, proposal_id: &str, support: u8, reason: &str) -> Result<String>;
}

pub fn parse_proposal_id(proposal_id: &str) -> Result<U256> {
    proposal_id
        .parse::<U256>()
        .with_context(|| format!("Invalid proposal id {proposal_id}"))
}

pub fn parse_clock_mode(mode: &str) -> ClockMode {
    if mode.to_lowercase().contains("mode=timestamp") {
        ClockMode::Timestamp
    } else {
        ClockMode::BlockNumber
    }
}

/// Governors that predate ERC-6372 revert on `CLOCK_MODE()` or return nothing. Anything else,
/// such as a timeout or a rate limit from the node, is not an answer about the governor.
fn clock_mode_unsupported(error: &ContractError) -> bool {
    match error {
        ContractError::ZeroData(..) | ContractError::AbiError(_) => true,
        ContractError::TransportError(e) => e
            .as_error_resp()
            .is_some_and(|payload| payload.message.to_lowercase().contains("revert")),
        _ => false,
    }
}

/// Governor access over JSON-RPC, signing votes with the agent's key.
pub struct AlloyGovernor {
    provider: DynProvider,
}

impl AlloyGovernor {
    pub fn new(rpc_url: &str, private_key: &str) -> Result<Self> {
        let signer: PrivateKeySigner = private_key
            .trim()
            .parse()
            .context("Failed to parse agent private key")?;
        let provider = ProviderBuilder::new()
            .wallet(signer)
            .connect_http(rpc_url.parse().context("Invalid RPC url")?)
            .erased();
        Ok(Self { provider })
    }
}

#[async_trait]
impl GovernorChain for AlloyGovernor {
    async fn status(&self, governor: Address, proposal_id: &str) -> Result<RawStatus> {
        let contract = IGovernor::new(governor, &self.provider);
        let state = contract
            .state(parse_proposal_id(proposal_id)?)
            .call()
            .await
            .with_context(|| format!("Failed to read state of proposal {proposal_id}"))?;
        Ok(RawStatus::Code(u64::from(state)))
    }

    async fn clock_mode(&self, governor: Address) -> Result<ClockMode> {
        let contract = IGovernor::new(governor, &self.provider);
        match contract.CLOCK_MODE().call().await {
            Ok(mode) => Ok(parse_clock_mode(&mode)),
            Err(e) if clock_mode_unsupported(&e) => {
                debug!(error = %e, governor = %governor, "CLOCK_MODE unavailable, assuming block numbers");
                Ok(ClockMode::BlockNumber)
            }
            Err(e) => Err(e).with_context(|| format!("Failed to read CLOCK_MODE of {governor}")),
        }
    }

    async fn block_interval(&self) -> Result<f64> {
        let latest_number = self.provider.get_block_number().await?;
        let sample = BLOCK_INTERVAL_SAMPLE.min(latest_number);
        if sample == 0 {
            bail!("Chain has no history to measure block interval");
        }

        let latest = self
            .provider
            .get_block_by_number(BlockNumberOrTag::Number(latest_number))
            .await?
            .context("Latest block not found")?;
        let past = self
            .provider
            .get_block_by_number(BlockNumberOrTag::Number(latest_number - sample))
            .await?
            .context("Sample block not found")?;

        let elapsed = latest.header.timestamp.saturating_sub(past.header.timestamp);
        if elapsed == 0 {
            bail!("Block timestamps did not advance over {sample} blocks");
        }
        Ok(elapsed as f64 / sample as f64)
    }

    #[instrument(name = "chain_cast_vote", skip(self, reason))]
    async fn cast_vote_with_reason(&self, governor: Address, proposal_id: &str, support: u8, reason: &str) -> Result<String> {
        let contract = IGovernor::new(governor, &self.provider);
        let receipt = contract
            .castVoteWithReason(parse_proposal_id(proposal_id)?, support, reason.to_string())
            .send()
            .await
            .context("Failed to submit castVoteWithReason")?
            .get_receipt()
            .await
            .context("Failed to fetch castVoteWithReason receipt")?;

        let transaction_hash = receipt.transaction_hash.to_string();
        if !receipt.status() {
            bail!("castVoteWithReason reverted in transaction {transaction_hash}");
        }

        info!(transaction_hash = %transaction_hash, "Vote cast on chain");
        Ok(transaction_hash)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChainMeta {
    pub clock_mode: ClockMode,
    pub block_interval_secs: f64,
}

#[derive(Clone)]
struct CachedInterval {
    seconds: f64,
    measured_at: Instant,
}

/// Clock modes per governor and block intervals per chain, shared by every discovery tick.
#[derive(Default)]
pub struct ChainMetaCache {
    clock_modes: Mutex<HashMap<Address, ClockMode>>,
    intervals: Mutex<HashMap<i32, CachedInterval>>,
}

impl ChainMetaCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn resolve(&self, chain: &dyn GovernorChain, chain_id: i32, governor: Address) -> Result<ChainMeta> {
        let cached_mode = self
            .clock_modes
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(&governor)
            .copied();
        let clock_mode = match cached_mode {
            Some(mode) => mode,
            None => {
                let mode = chain.clock_mode(governor).await?;
                self.clock_modes
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner())
                    .insert(governor, mode);
                mode
            }
        };

        if clock_mode == ClockMode::Timestamp {
            return Ok(ChainMeta {
                clock_mode,
                block_interval_secs: 0.0,
            });
        }

        let cached_interval = self
            .intervals
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(&chain_id)
            .filter(|cached| cached.measured_at.elapsed() < BLOCK_INTERVAL_TTL)
            .cloned();
        let block_interval_secs = match cached_interval {
            Some(cached) => cached.seconds,
            None => {
                let seconds = chain.block_interval().await?;
                if seconds <= 0.0 || !seconds.is_finite() {
                    warn!(chain_id = chain_id, seconds = seconds, "Measured block interval is not usable");
                    bail!("Unusable block interval {seconds} on chain {chain_id}");
                }
                debug!(chain_id = chain_id, seconds = seconds, "Measured block interval");
                self.intervals
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner())
                    .insert(
                        chain_id,
                        CachedInterval {
                            seconds,
                            measured_at: Instant::now(),
                        },
                    );
                seconds
            }
        };

        Ok(ChainMeta {
            clock_mode,
            block_interval_secs,
        })
    }
}
