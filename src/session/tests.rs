//! Session tests against the local chain

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio_test::{assert_err, assert_ok};

    use crate::domain::{Address, DomainError, ErrorClass, FlowStatus, TokenAmount, Wei};
    use crate::engine::{LocalChain, LocalChainConfig, SettlementEngine};
    use crate::error::AppError;
    use crate::jobs::PollerConfig;
    use crate::session::{AccountBalances, DashboardSession, SessionConfig};
    use crate::store::{MemoryStore, DEFAULT_STORAGE_KEY};

    const ACCOUNT: &str = "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266";
    const ALICE: &str = "0x70997970C51812dc3A010C7d01b50e0d17dc79C8";
    const BOB: &str = "0x3C44CdDdB6a900fa2b585dd299e03d12FA4293BC";
    const OUTSIDER: &str = "0x1111111111111111111111111111111111111111";
    const UNDERLYING: &str = "0x6384D5F8999EaAC8bcCfae137D4e535075b47494";
    const WRAPPED: &str = "0x357f63DB7C18C99051f9507532F426c2A070975a";

    fn address(s: &str) -> Address {
        Address::parse(s).unwrap()
    }

    fn tokens(s: &str) -> Wei {
        s.parse::<TokenAmount>().unwrap().to_wei()
    }

    fn chain_with_delay(delay: Duration) -> Arc<LocalChain> {
        Arc::new(LocalChain::new(LocalChainConfig {
            chain_id: 31337,
            underlying_token: address(UNDERLYING),
            wrapped_token: address(WRAPPED),
            confirmation_delay: delay,
        }))
    }

    fn session_config(poll: Duration) -> SessionConfig {
        SessionConfig {
            account: address(ACCOUNT),
            underlying_token: address(UNDERLYING),
            wrapped_token: address(WRAPPED),
            default_monthly_amount: dec!(2000),
            partial_unwrap_percent: 80,
            signer_accounts: vec![address(ACCOUNT), address(ALICE), address(BOB)],
            pollers: PollerConfig::every(poll),
        }
    }

    /// Session over a chain where the account holds 10000 underlying tokens
    async fn setup_with(chain: Arc<LocalChain>, config: SessionConfig) -> DashboardSession {
        chain.mint_underlying(&address(ACCOUNT), tokens("10000")).await;
        DashboardSession::open(
            chain,
            Arc::new(MemoryStore::new(DEFAULT_STORAGE_KEY)),
            config,
        )
        .await
        .unwrap()
    }

    async fn setup() -> (Arc<LocalChain>, DashboardSession) {
        let chain = chain_with_delay(Duration::ZERO);
        let session = setup_with(chain.clone(), session_config(Duration::from_secs(5))).await;
        (chain, session)
    }

    fn domain_error(err: AppError) -> DomainError {
        match err {
            AppError::Domain(e) => e,
            other => panic!("expected domain error, got {:?}", other),
        }
    }

    // =========================================================================
    // Connection
    // =========================================================================

    #[tokio::test]
    async fn test_connect_loads_balances() {
        let (_chain, session) = setup().await;

        let overview = assert_ok!(session.connect().await);

        assert!(overview.connected);
        assert!(overview.connected_at.is_some());
        assert_eq!(overview.chain_id, 31337);
        assert_eq!(overview.balances.underlying, dec!(10000));
        assert_eq!(overview.balances.wrapped, dec!(0));
        assert!(!overview.streaming);

        session.disconnect().await;
    }

    #[tokio::test]
    async fn test_connect_rejects_missing_contract() {
        let chain = chain_with_delay(Duration::ZERO);
        let mut config = session_config(Duration::from_secs(5));
        config.wrapped_token = address(OUTSIDER);
        let session = setup_with(chain, config).await;

        let err = domain_error(assert_err!(session.connect().await));

        assert!(matches!(
            err,
            DomainError::ContractNotDeployed {
                name: "wrapped token",
                ..
            }
        ));
        assert!(!session.is_connected().await);
    }

    #[tokio::test]
    async fn test_actions_require_connection() {
        let (_chain, session) = setup().await;

        let err = domain_error(assert_err!(session.wrap("1").await));
        assert_eq!(err, DomainError::NotConnected);

        let err = domain_error(assert_err!(session.add_recipient(ALICE).await));
        assert_eq!(err, DomainError::NotConnected);
    }

    #[tokio::test]
    async fn test_reconnect_restarts_pollers() {
        let (_chain, session) = setup().await;

        assert_ok!(session.connect().await);
        assert_ok!(session.connect().await);
        assert!(session.is_connected().await);

        assert!(session.disconnect().await);
        assert!(!session.disconnect().await);
    }

    #[tokio::test]
    async fn test_pollers_refresh_balances_while_connected() {
        let chain = chain_with_delay(Duration::ZERO);
        let session = setup_with(chain.clone(), session_config(Duration::from_millis(50))).await;
        session.connect().await.unwrap();

        chain.mint_underlying(&address(ACCOUNT), tokens("5")).await;
        tokio::time::sleep(Duration::from_millis(250)).await;

        assert_eq!(session.balances().await.underlying, dec!(10005));
        session.disconnect().await;
    }

    #[tokio::test]
    async fn test_disconnect_stops_pollers() {
        let chain = chain_with_delay(Duration::ZERO);
        let session = setup_with(chain.clone(), session_config(Duration::from_millis(50))).await;
        session.connect().await.unwrap();

        assert!(session.disconnect().await);
        assert_eq!(session.balances().await, AccountBalances::default());

        chain.mint_underlying(&address(ACCOUNT), tokens("5")).await;
        tokio::time::sleep(Duration::from_millis(250)).await;

        assert_eq!(session.balances().await, AccountBalances::default());
        assert!(!session.is_connected().await);
    }

    // =========================================================================
    // Wrap / unwrap
    // =========================================================================

    #[tokio::test]
    async fn test_wrap_approves_once() {
        let (_chain, session) = setup().await;
        session.connect().await.unwrap();

        let first = assert_ok!(session.wrap("1000").await);
        assert!(first.approval_tx_hash.is_some());
        assert_eq!(first.balances.underlying, dec!(9000));
        assert_eq!(first.balances.wrapped, dec!(1000));

        let second = assert_ok!(session.wrap("0.5").await);
        assert!(second.approval_tx_hash.is_none());
        assert_eq!(second.balances.wrapped, dec!(1000.5));

        session.disconnect().await;
    }

    #[tokio::test]
    async fn test_wrap_beyond_balance() {
        let (chain, session) = setup().await;
        session.connect().await.unwrap();

        let err = assert_err!(session.wrap("10000.000000000000000001").await);
        assert_eq!(err.class(), ErrorClass::Precondition);
        assert!(matches!(
            domain_error(err),
            DomainError::InsufficientBalance { .. }
        ));

        // nothing was approved or wrapped
        assert_eq!(
            chain.allowance(&address(ACCOUNT)).await.unwrap(),
            Wei::ZERO
        );
        assert_eq!(session.balances().await.underlying, dec!(10000));
        session.disconnect().await;
    }

    #[tokio::test]
    async fn test_wrap_invalid_amount() {
        let (_chain, session) = setup().await;
        session.connect().await.unwrap();

        for input in ["0", "-3", "ten", ""] {
            let err = assert_err!(session.wrap(input).await);
            assert_eq!(err.class(), ErrorClass::Validation, "input {:?}", input);
        }
        session.disconnect().await;
    }

    #[tokio::test]
    async fn test_unwrap() {
        let (_chain, session) = setup().await;
        session.connect().await.unwrap();
        session.wrap("100").await.unwrap();

        let err = domain_error(assert_err!(session.unwrap("100.01").await));
        assert!(matches!(err, DomainError::InsufficientBalance { .. }));

        let receipt = assert_ok!(session.unwrap("40").await);
        assert_eq!(receipt.balances.wrapped, dec!(60));
        assert_eq!(receipt.balances.underlying, dec!(9940));
        session.disconnect().await;
    }

    #[tokio::test]
    async fn test_unwrap_for_recipient() {
        let (chain, session) = setup().await;
        let alice = address(ALICE);
        chain.mint_underlying(&alice, tokens("100")).await;
        chain.approve(&alice, Wei::MAX).await.unwrap();
        chain.wrap(&alice, tokens("100")).await.unwrap();
        session.connect().await.unwrap();

        let result = assert_ok!(session.unwrap_for_recipient(ALICE).await);

        assert_eq!(result.amount, dec!(80));
        assert_eq!(result.percent, 80);
        assert_eq!(chain.underlying_balance(&alice).await.unwrap(), tokens("80"));
        assert_eq!(
            chain.query_balance(&alice).await.unwrap().available,
            tokens("20")
        );
        session.disconnect().await;
    }

    #[tokio::test]
    async fn test_unwrap_for_recipient_preconditions() {
        let (_chain, session) = setup().await;
        session.connect().await.unwrap();

        let err = domain_error(assert_err!(session.unwrap_for_recipient(OUTSIDER).await));
        assert!(matches!(err, DomainError::UnknownSigner(_)));

        let err = domain_error(assert_err!(session.unwrap_for_recipient(BOB).await));
        assert!(matches!(err, DomainError::NothingToUnwrap(_)));

        let err = assert_err!(session.unwrap_for_recipient("bob").await);
        assert_eq!(err.class(), ErrorClass::Validation);
        session.disconnect().await;
    }

    // =========================================================================
    // Recipients and the loading gate
    // =========================================================================

    #[tokio::test]
    async fn test_overview_totals() {
        let (_chain, session) = setup().await;
        session.connect().await.unwrap();
        session.wrap("1000").await.unwrap();

        session.add_recipient(ALICE).await.unwrap();
        session.add_recipient(BOB).await.unwrap();
        let paused = session.pause(BOB).await.unwrap();
        assert_eq!(paused.recipient.status, FlowStatus::Paused);

        let overview = session.overview().await;
        assert_eq!(overview.recipients.len(), 2);
        assert!(overview.streaming);
        assert_eq!(overview.total_monthly_outflow, dec!(2000));

        session.resume(BOB).await.unwrap();
        assert_eq!(session.overview().await.total_monthly_outflow, dec!(4000));

        session.remove(ALICE).await.unwrap();
        session.remove(BOB).await.unwrap();
        assert!(!session.overview().await.streaming);
        session.disconnect().await;
    }

    #[tokio::test]
    async fn test_clear_recipients_without_connection() {
        let (_chain, session) = setup().await;
        session.connect().await.unwrap();
        session.wrap("1000").await.unwrap();
        session.add_recipient(ALICE).await.unwrap();
        session.disconnect().await;

        assert_eq!(assert_ok!(session.clear_recipients().await), 1);
        assert!(session.recipients().await.is_empty());
    }

    #[tokio::test]
    async fn test_second_action_is_busy() {
        let chain = chain_with_delay(Duration::from_millis(300));
        let session =
            Arc::new(setup_with(chain, session_config(Duration::from_secs(5))).await);
        session.connect().await.unwrap();

        let in_flight = {
            let session = session.clone();
            tokio::spawn(async move { session.wrap("10").await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;

        let err = domain_error(assert_err!(session.add_recipient(ALICE).await));
        assert_eq!(err, DomainError::Busy);

        assert_ok!(in_flight.await.unwrap());
        assert!(session.recipients().await.is_empty());

        // gate is released once the first action finishes
        assert_ok!(session.unwrap("1").await);
        session.disconnect().await;
    }

    #[tokio::test]
    async fn test_reconcile_now() {
        let (chain, session) = setup().await;
        assert!(session.reconcile_now().await.is_err());

        session.connect().await.unwrap();
        session.wrap("1000").await.unwrap();
        session.add_recipient(ALICE).await.unwrap();
        chain
            .close_flow(&address(ACCOUNT), &address(ALICE))
            .await
            .unwrap();

        let report = assert_ok!(session.reconcile_now().await);
        assert_eq!(report.transitions.len(), 1);
        assert_eq!(
            session.registry().get(ALICE).await.unwrap().status,
            FlowStatus::Paused
        );
        session.disconnect().await;
    }
}
