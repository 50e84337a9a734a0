//! Example: driving the attestation registry through a ledger
//!
//! Run with: cargo run --example registry_walkthrough
//! Set RUST_LOG=attestation_registry=debug to see registry tracing.

use anyhow::Context;
use attestation_registry::{
    Call, Identity, Ledger, LedgerConfig, SignedTransaction, Signer, Transaction,
};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    println!("Proof-of-Attestation Registry - Example Usage\n");

    // Step 1: Deploy with a key-backed authority
    let config = LedgerConfig::default();
    let authority = Signer::generate();
    let ledger = Ledger::deploy(config.clone(), authority.identity());
    println!("1. Deployed on {} with authority {}\n", config.chain_id, authority.identity());

    let user_a = Identity::from("user_a");
    let outsider = Identity::from("outsider");

    // Step 2: Authority attests user_a with code 100
    let tx = SignedTransaction::sign(
        &authority,
        &config.chain_id,
        ledger.next_nonce(&authority.identity()).await,
        Call::CreateAttestation {
            subject: user_a.clone(),
            status_code: 100,
        },
    )
    .context("signing create-attestation")?;
    let receipt = ledger.submit_signed(tx).await?;
    println!("2. create-attestation(user_a, u100) -> {}", receipt.output);

    let status = ledger
        .call_read_only(&Call::GetAttestationStatus { subject: user_a.clone() })
        .await?;
    println!("   get-attestation-status(user_a) -> {}\n", status);

    // Step 3: A non-authority tries to overwrite it
    let receipt = ledger
        .submit(Transaction::new(
            outsider,
            Call::CreateAttestation {
                subject: user_a.clone(),
                status_code: 200,
            },
        ))
        .await;
    println!("3. create-attestation(user_a, u200) by outsider -> {}\n", receipt.output);

    // Step 4: Authority revokes
    let tx = SignedTransaction::sign(
        &authority,
        &config.chain_id,
        ledger.next_nonce(&authority.identity()).await,
        Call::RevokeAttestation { subject: user_a.clone() },
    )
    .context("signing revoke-attestation")?;
    let receipt = ledger.submit_signed(tx).await?;
    println!("4. revoke-attestation(user_a) -> {}", receipt.output);

    let status = ledger
        .call_read_only(&Call::GetAttestationStatus { subject: user_a })
        .await?;
    println!("   get-attestation-status(user_a) -> {}\n", status);

    // Step 5: Fingerprint the final state
    let root = ledger.state_root().await?;
    println!("5. Height {} state root 0x{}", ledger.height().await, hex::encode(root));

    Ok(())
}
