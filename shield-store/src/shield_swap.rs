use std::collections::HashMap;

use alloy::primitives::Address;
use log::debug;
use serde::{Deserialize, Serialize};
use shield_common::{EncryptedOrder, FheType, Handle, PROTOCOL_ID, ZERO_HANDLE};

use crate::{
    error::{ensure, StoreError},
    runtime::{CallContext, FheRuntime},
};

/// The order stored for one account.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub from_amount: Handle,
    pub to_amount: Handle,
    /// Timestamp of the block that wrote the order; 0 iff there is no order.
    pub timestamp: u64,
}

impl Order {
    pub fn handles(&self) -> EncryptedOrder {
        EncryptedOrder::new(self.from_amount, self.to_amount)
    }
}

/// The `OrderCreated(address indexed user, uint256 timestamp)` event.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderCreated {
    pub user: Address,
    pub timestamp: u64,
}

/// State of one ShieldSwap deployment.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShieldSwap {
    address: Address,
    orders: HashMap<Address, Order>,
}

impl ShieldSwap {
    pub fn new(address: Address) -> Self {
        Self {
            address,
            orders: HashMap::new(),
        }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    /// Store `(from_amount, to_amount)` as the caller's order, replacing any
    /// previous one.
    ///
    /// Both handles are validated against `input_proof` before anything is
    /// written; on error the store is left untouched.
    pub fn set_order<R: FheRuntime>(
        &mut self,
        runtime: &mut R,
        ctx: &CallContext,
        from_amount: Handle,
        to_amount: Handle,
        input_proof: &[u8],
    ) -> Result<OrderCreated, StoreError> {
        ensure(
            ctx.contract == self.address,
            format!(
                "call for {} dispatched to deployment {}",
                ctx.contract, self.address
            ),
        )?;
        ensure(ctx.block_timestamp > 0, "block timestamp must be non-zero")?;
        if input_proof.is_empty() {
            return Err(StoreError::invalid_proof("empty input proof"));
        }
        if from_amount == ZERO_HANDLE || to_amount == ZERO_HANDLE {
            return Err(StoreError::invalid_proof("zero handle"));
        }

        let from_amount = runtime.from_external(from_amount, FheType::Uint32, input_proof, ctx)?;
        let to_amount = runtime.from_external(to_amount, FheType::Uint32, input_proof, ctx)?;

        runtime.allow_this(from_amount, ctx);
        runtime.allow(from_amount, ctx.sender);
        runtime.allow_this(to_amount, ctx);
        runtime.allow(to_amount, ctx.sender);

        self.orders.insert(
            ctx.sender,
            Order {
                from_amount,
                to_amount,
                timestamp: ctx.block_timestamp,
            },
        );
        debug!(
            "order of {} stored in {} at {}",
            ctx.sender, self.address, ctx.block_timestamp
        );

        Ok(OrderCreated {
            user: ctx.sender,
            timestamp: ctx.block_timestamp,
        })
    }

    /// Handles of `caller`'s order, or the zero pair.
    pub fn get_my_order(&self, caller: Address) -> EncryptedOrder {
        self.orders
            .get(&caller)
            .map(Order::handles)
            .unwrap_or(EncryptedOrder::EMPTY)
    }

    pub fn has_order(&self, caller: Address) -> bool {
        !self.get_my_order(caller).is_empty()
    }

    /// Timestamp of `caller`'s order, 0 if none.
    pub fn get_my_order_timestamp(&self, caller: Address) -> u64 {
        self.orders
            .get(&caller)
            .map(|order| order.timestamp)
            .unwrap_or_default()
    }

    pub fn protocol_id() -> u64 {
        PROTOCOL_ID
    }

    /// Number of accounts holding an order.
    pub fn order_count(&self) -> usize {
        self.orders.len()
    }
}
