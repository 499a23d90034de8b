//! End to end flows against the local devnet through its ports.
use alloy::{
    primitives::{keccak256, Address, Bytes},
    signers::{local::PrivateKeySigner, SignerSync},
    sol_types::SolStruct,
};
use anyhow::Result;
use fhevm_local::{accounts::dev_signer, log::init_logging, LocalChain, LocalNode};
use shield_common::{
    eip712::UserDecryptRequestVerification,
    ports::{DecryptionOracle, EncryptionService, OrderStorePort},
    ChainError, EncryptedOrder, HandleContractPair, ServiceError, UserDecryptRequest,
    SECONDS_PER_DAY,
};
use test_log::test;

const START: u64 = 1_750_000_000;

struct Devnet {
    node: LocalNode,
    contract: Address,
    alice: PrivateKeySigner,
    bob: PrivateKeySigner,
}

async fn devnet() -> Devnet {
    init_logging();
    let mut chain = LocalChain::default();
    chain.set_time(START);
    let deployer = dev_signer(0).unwrap().address();
    let (contract, _) = chain.deploy_named("ShieldSwap", deployer);
    Devnet {
        node: LocalNode::new(chain),
        contract,
        alice: dev_signer(1).unwrap(),
        bob: dev_signer(2).unwrap(),
    }
}

/// Encrypt and submit `(from, to)` as `user`'s order.
async fn submit(
    node: &LocalNode,
    contract: Address,
    user: &PrivateKeySigner,
    from: u32,
    to: u32,
) -> Result<EncryptedOrder> {
    let input = node
        .create_encrypted_input(contract, user.address())
        .add32(from)
        .add32(to)
        .encrypt()
        .await?;
    let order = EncryptedOrder::new(input.handles[0], input.handles[1]);
    let tx = node
        .send_set_order(contract, user, order, input.input_proof)
        .await?;
    let receipt = node.wait_for_receipt(tx).await?;
    assert!(receipt.status);
    Ok(order)
}

fn sign_request(
    node: &LocalNode,
    user: &PrivateKeySigner,
    contracts: &[Address],
    start_timestamp: u64,
    duration_days: u64,
) -> UserDecryptRequest {
    let private_key = Bytes::from(keccak256(user.address()).to_vec());
    let public_key = Bytes::from(keccak256(&private_key).to_vec());
    let payload = UserDecryptRequestVerification::for_grant(
        public_key.clone(),
        contracts,
        start_timestamp,
        duration_days,
    );
    let signature = user
        .sign_hash_sync(&payload.eip712_signing_hash(&node.eip712_domain()))
        .unwrap();
    UserDecryptRequest {
        public_key,
        private_key,
        signature: Bytes::from(signature.as_bytes().to_vec()),
        contract_addresses: contracts.to_vec(),
        user_address: user.address(),
        start_timestamp,
        duration_days,
    }
}

fn pairs(order: &EncryptedOrder, contract: Address) -> Vec<HandleContractPair> {
    [order.from_amount, order.to_amount]
        .into_iter()
        .map(|handle| HandleContractPair {
            handle,
            contract_address: contract,
        })
        .collect()
}

#[test(tokio::test)]
async fn fresh_account_reads_zero_state() -> Result<()> {
    let net = devnet().await;
    let user = net.alice.address();

    assert_eq!(net.node.get_my_order(net.contract, user).await?, EncryptedOrder::EMPTY);
    assert!(!net.node.has_order(net.contract, user).await?);
    assert_eq!(net.node.get_my_order_timestamp(net.contract, user).await?, 0);
    assert_eq!(net.node.protocol_id(net.contract).await?, 10001);
    Ok(())
}

#[test(tokio::test)]
async fn submit_then_decrypt() -> Result<()> {
    let net = devnet().await;
    let order = submit(&net.node, net.contract, &net.alice, 100, 2500).await?;

    assert_eq!(
        net.node.get_my_order(net.contract, net.alice.address()).await?,
        order
    );
    assert!(net.node.has_order(net.contract, net.alice.address()).await?);
    assert!(
        net.node
            .get_my_order_timestamp(net.contract, net.alice.address())
            .await?
            > 0
    );

    let request = sign_request(&net.node, &net.alice, &[net.contract], START, 365);
    let clear = net
        .node
        .user_decrypt(&pairs(&order, net.contract), &request)
        .await?;
    assert_eq!(clear[&order.from_amount], 100);
    assert_eq!(clear[&order.to_amount], 2500);
    Ok(())
}

#[test(tokio::test)]
async fn resubmission_replaces_the_order() -> Result<()> {
    let net = devnet().await;
    let first = submit(&net.node, net.contract, &net.alice, 50, 1000).await?;
    let second = submit(&net.node, net.contract, &net.alice, 200, 5000).await?;
    assert_ne!(first, second);

    let stored = net.node.get_my_order(net.contract, net.alice.address()).await?;
    assert_eq!(stored, second);

    let request = sign_request(&net.node, &net.alice, &[net.contract], START, 1);
    let clear = net
        .node
        .user_decrypt(&pairs(&stored, net.contract), &request)
        .await?;
    assert_eq!((clear[&stored.from_amount], clear[&stored.to_amount]), (200, 5000));
    Ok(())
}

#[test(tokio::test)]
async fn orders_are_private_to_their_owner() -> Result<()> {
    let net = devnet().await;
    let alice_order = submit(&net.node, net.contract, &net.alice, 7, 8).await?;

    assert_eq!(
        net.node.get_my_order(net.contract, net.bob.address()).await?,
        EncryptedOrder::EMPTY
    );
    assert!(!net.node.has_order(net.contract, net.bob.address()).await?);

    // Bob holds a valid grant of his own but no ACL permission on Alice's
    // handles.
    let request = sign_request(&net.node, &net.bob, &[net.contract], START, 1);
    let err = net
        .node
        .user_decrypt(&pairs(&alice_order, net.contract), &request)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Unauthorized(_)));
    Ok(())
}

#[test(tokio::test)]
async fn empty_proof_reverts() -> Result<()> {
    let net = devnet().await;
    let input = net
        .node
        .encrypt(
            net.contract,
            net.alice.address(),
            &[
                (shield_common::FheType::Uint32, 1),
                (shield_common::FheType::Uint32, 2),
            ],
        )
        .await?;
    let order = EncryptedOrder::new(input.handles[0], input.handles[1]);

    let err = net
        .node
        .send_set_order(net.contract, &net.alice, order, Bytes::new())
        .await
        .unwrap_err();
    assert!(matches!(err, ChainError::Reverted(_)));
    assert!(!net.node.has_order(net.contract, net.alice.address()).await?);
    Ok(())
}

#[test(tokio::test)]
async fn proofs_are_bound_to_user_and_contract() -> Result<()> {
    let net = devnet().await;
    let other_contract = net
        .node
        .write(|chain| chain.deploy(dev_signer(0).unwrap().address()))
        .await;

    // Encrypted by Alice, replayed by Bob.
    let input = net
        .node
        .create_encrypted_input(net.contract, net.alice.address())
        .add32(1)
        .add32(2)
        .encrypt()
        .await?;
    let order = EncryptedOrder::new(input.handles[0], input.handles[1]);
    let err = net
        .node
        .send_set_order(net.contract, &net.bob, order, input.input_proof.clone())
        .await
        .unwrap_err();
    assert!(matches!(err, ChainError::Reverted(_)));

    // Encrypted for one contract, sent to another.
    let err = net
        .node
        .send_set_order(other_contract, &net.alice, order, input.input_proof)
        .await
        .unwrap_err();
    assert!(matches!(err, ChainError::Reverted(_)));
    Ok(())
}

#[test(tokio::test)]
async fn handles_from_another_batch_are_rejected() -> Result<()> {
    let net = devnet().await;
    let first = net
        .node
        .create_encrypted_input(net.contract, net.alice.address())
        .add32(1)
        .add32(2)
        .encrypt()
        .await?;
    let second = net
        .node
        .create_encrypted_input(net.contract, net.alice.address())
        .add32(3)
        .add32(4)
        .encrypt()
        .await?;

    let mixed = EncryptedOrder::new(first.handles[0], second.handles[1]);
    let err = net
        .node
        .send_set_order(net.contract, &net.alice, mixed, first.input_proof)
        .await
        .unwrap_err();
    assert!(matches!(err, ChainError::Reverted(ref msg) if msg.contains("not covered")));
    Ok(())
}

#[test(tokio::test)]
async fn decryption_grants_are_checked() -> Result<()> {
    let net = devnet().await;
    let order = submit(&net.node, net.contract, &net.alice, 100, 2500).await?;
    let pairs = pairs(&order, net.contract);

    // Expired.
    let request = sign_request(
        &net.node,
        &net.alice,
        &[net.contract],
        START - 2 * SECONDS_PER_DAY,
        1,
    );
    let err = net.node.user_decrypt(&pairs, &request).await.unwrap_err();
    assert!(matches!(err, ServiceError::Unauthorized(_)));

    // Not yet valid.
    let request = sign_request(&net.node, &net.alice, &[net.contract], START + 60, 1);
    let err = net.node.user_decrypt(&pairs, &request).await.unwrap_err();
    assert!(matches!(err, ServiceError::Unauthorized(_)));

    // Signed by someone else on Alice's behalf.
    let mut request = sign_request(&net.node, &net.bob, &[net.contract], START, 1);
    request.user_address = net.alice.address();
    let err = net.node.user_decrypt(&pairs, &request).await.unwrap_err();
    assert!(matches!(err, ServiceError::Unauthorized(_)));

    // Contract missing from the grant.
    let request = sign_request(&net.node, &net.alice, &[Address::repeat_byte(3)], START, 1);
    let err = net.node.user_decrypt(&pairs, &request).await.unwrap_err();
    assert!(matches!(err, ServiceError::Unauthorized(_)));

    // Too long.
    let request = sign_request(&net.node, &net.alice, &[net.contract], START, 366);
    let err = net.node.user_decrypt(&pairs, &request).await.unwrap_err();
    assert!(matches!(err, ServiceError::Rejected(_)));
    Ok(())
}

#[test(tokio::test)]
async fn offline_node_reports_transport_errors() -> Result<()> {
    let net = devnet().await;
    net.node.set_offline(true);
    let err = net
        .node
        .get_my_order(net.contract, net.alice.address())
        .await
        .unwrap_err();
    assert!(err.is_transport());

    net.node.set_offline(false);
    net.node.get_my_order(net.contract, net.alice.address()).await?;
    Ok(())
}

#[test(tokio::test)]
async fn state_survives_save_and_load() -> Result<()> {
    let net = devnet().await;
    let order = submit(&net.node, net.contract, &net.alice, 100, 2500).await?;

    let path = testfile::generate_name();
    net.node.save(&path).await?;
    let restored = LocalNode::load(&path).await?;
    let _ = std::fs::remove_file(&path);

    assert_eq!(
        restored.get_my_order(net.contract, net.alice.address()).await?,
        order
    );
    let deployed = restored.read(|chain| chain.deployment("ShieldSwap")).await;
    assert_eq!(deployed, Some(net.contract));

    // The coprocessor key and plaintexts are part of the state.
    let request = sign_request(&restored, &net.alice, &[net.contract], START, 1);
    let clear = restored
        .user_decrypt(&pairs(&order, net.contract), &request)
        .await?;
    assert_eq!(clear[&order.to_amount], 2500);
    Ok(())
}
