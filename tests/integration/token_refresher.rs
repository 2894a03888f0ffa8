//! Integration tests for the background token refresher.

// std
use std::{sync::Arc, time::Duration};
// crates.io
use realm_credentials::{RefreshConfig, RefresherPhase, Result, TokenRefresher};
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;
// self
use crate::support::{Outcome, ScriptedService};

fn config() -> RefreshConfig {
	RefreshConfig::new("https://sso.example.com", "svc", "secret", "demo")
		.with_early_refresh(Duration::from_secs(5))
}

fn suffix(value: &str) -> &str {
	value.rsplit('-').next().unwrap_or_default()
}

#[tokio::test(start_paused = true)]
async fn renews_access_token_ahead_of_expiry() -> Result<()> {
	let _ = tracing_subscriber::fmt::try_init();

	let origin = Instant::now();
	let service = Arc::new(ScriptedService::new(10, 0));
	let cancel = CancellationToken::new();
	let refresher = TokenRefresher::with_service(config(), service.clone(), &cancel).await?;

	assert_eq!(refresher.access_token().await, "access-1");

	time::sleep(Duration::from_secs(4)).await;

	assert_eq!(service.calls().len(), 1);

	time::sleep(Duration::from_secs(2)).await;

	let calls = service.calls();

	assert_eq!(calls.len(), 2);
	assert_eq!(calls[1].grant, "client_credentials");

	let renewed_after = calls[1].at - origin;

	assert!(renewed_after >= Duration::from_secs(4) && renewed_after <= Duration::from_secs(6));
	assert_eq!(refresher.access_token().await, "access-2");
	assert_eq!(refresher.metrics().snapshot().logins, 1);

	refresher.shutdown().await;

	Ok(())
}

#[tokio::test(start_paused = true)]
async fn exchanges_refresh_token_when_it_expires_first() -> Result<()> {
	let _ = tracing_subscriber::fmt::try_init();

	let service = Arc::new(ScriptedService::new(30, 10));
	let cancel = CancellationToken::new();
	let refresher = TokenRefresher::with_service(config(), service.clone(), &cancel).await?;

	time::sleep(Duration::from_secs(6)).await;

	let calls = service.calls();

	assert_eq!(calls.len(), 2);
	assert_eq!(calls[1].grant, "refresh_token");
	assert_eq!(calls[1].refresh_token.as_deref(), Some("refresh-1"));

	let token = refresher.token().await;

	assert_eq!(token.access_token.expose(), "access-2");
	assert_eq!(token.refresh_token.expose(), "refresh-2");
	assert_eq!(refresher.metrics().snapshot().refreshes, 1);

	refresher.shutdown().await;

	Ok(())
}

#[tokio::test(start_paused = true)]
async fn retries_failed_renewals_every_retry_delay() -> Result<()> {
	let _ = tracing_subscriber::fmt::try_init();

	let service = Arc::new(ScriptedService::new(10, 0).with_script([
		Outcome::Issue,
		Outcome::Unavailable,
		Outcome::Unavailable,
		Outcome::Rejected,
		Outcome::Issue,
	]));
	let cancel = CancellationToken::new();
	let refresher = TokenRefresher::with_service(config(), service.clone(), &cancel).await?;

	time::sleep(Duration::from_millis(7_500)).await;

	let status = refresher.status().await;

	assert_eq!(status.consecutive_failures, 3);
	assert!(status.last_error.is_some());
	assert_eq!(refresher.access_token().await, "access-1");

	time::sleep(Duration::from_secs(1)).await;

	let calls = service.calls();
	let attempts: Vec<Duration> = calls.windows(2).map(|pair| pair[1].at - pair[0].at).collect();

	assert_eq!(calls.len(), 5);
	assert_eq!(attempts[1..], [Duration::from_secs(1); 3]);
	assert_eq!(refresher.access_token().await, "access-2");

	let status = refresher.status().await;
	let snapshot = refresher.metrics().snapshot();

	assert_eq!(status.consecutive_failures, 0);
	assert!(status.last_error.is_none());
	assert_eq!(snapshot.failures, 3);
	assert_eq!(snapshot.permanent_failures, 1);
	assert_eq!(snapshot.logins, 1);

	refresher.shutdown().await;

	Ok(())
}

#[tokio::test(start_paused = true)]
async fn readers_never_observe_a_torn_token() -> Result<()> {
	let _ = tracing_subscriber::fmt::try_init();

	let service = Arc::new(ScriptedService::new(8, 6));
	let cancel = CancellationToken::new();
	let refresher =
		Arc::new(TokenRefresher::with_service(config(), service.clone(), &cancel).await?);
	let reader = {
		let refresher = refresher.clone();

		tokio::spawn(async move {
			for _ in 0..600 {
				let token = refresher.token().await;

				assert_eq!(suffix(token.access_token.expose()), suffix(token.refresh_token.expose()));

				time::sleep(Duration::from_millis(100)).await;
			}
		})
	};

	reader.await.expect("reader task");

	assert!(service.calls().len() > 10);

	refresher.shutdown().await;

	Ok(())
}

#[tokio::test(start_paused = true)]
async fn cancellation_stops_renewals_and_keeps_last_token() -> Result<()> {
	let _ = tracing_subscriber::fmt::try_init();

	let service = Arc::new(ScriptedService::new(10, 0));
	let cancel = CancellationToken::new();
	let refresher = TokenRefresher::with_service(config(), service.clone(), &cancel).await?;

	cancel.cancel();
	time::sleep(Duration::from_millis(10)).await;

	let status = refresher.status().await;

	assert_eq!(status.phase, RefresherPhase::Stopped);
	assert!(status.is_stale());

	time::sleep(Duration::from_secs(60)).await;

	assert_eq!(service.calls().len(), 1);
	assert_eq!(refresher.access_token().await, "access-1");

	Ok(())
}

#[tokio::test(start_paused = true)]
async fn dropping_the_refresher_leaves_the_caller_token_alone() -> Result<()> {
	let _ = tracing_subscriber::fmt::try_init();

	let service = Arc::new(ScriptedService::new(10, 0));
	let cancel = CancellationToken::new();
	let refresher = TokenRefresher::with_service(config(), service.clone(), &cancel).await?;

	drop(refresher);
	time::sleep(Duration::from_secs(60)).await;

	assert!(!cancel.is_cancelled());
	assert_eq!(service.calls().len(), 1);

	Ok(())
}

#[tokio::test(start_paused = true)]
async fn failed_initial_login_starts_nothing() {
	let _ = tracing_subscriber::fmt::try_init();

	let service = Arc::new(ScriptedService::new(10, 0).with_script([Outcome::Rejected]));
	let cancel = CancellationToken::new();
	let err = TokenRefresher::with_service(config(), service.clone(), &cancel)
		.await
		.expect_err("initial login fails");

	assert!(err.is_permanent());
	assert_eq!(err.remote_error_code().as_deref(), Some("invalid_client"));

	time::sleep(Duration::from_secs(60)).await;

	assert_eq!(service.calls().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn unbounded_token_lifetime_stays_live() -> Result<()> {
	let _ = tracing_subscriber::fmt::try_init();

	let service = Arc::new(ScriptedService::new(u64::MAX, u64::MAX));
	let cancel = CancellationToken::new();
	let refresher = TokenRefresher::with_service(config(), service.clone(), &cancel).await?;

	time::sleep(Duration::from_secs(60)).await;

	let status = refresher.status().await;

	assert_eq!(status.phase, RefresherPhase::Live);
	assert!(!status.is_stale());
	assert_eq!(service.calls().len(), 1);

	refresher.shutdown().await;

	assert_eq!(refresher.status().await.phase, RefresherPhase::Stopped);

	Ok(())
}

#[tokio::test(start_paused = true)]
async fn already_expired_tokens_are_renewed_at_most_once_per_retry_delay() -> Result<()> {
	let _ = tracing_subscriber::fmt::try_init();

	let service = Arc::new(ScriptedService::new(0, 0));
	let cancel = CancellationToken::new();
	let refresher = TokenRefresher::with_service(config(), service.clone(), &cancel).await?;

	time::sleep(Duration::from_millis(5_500)).await;

	let calls = service.calls();

	assert_eq!(calls.len(), 6);
	assert!(calls.windows(2).all(|pair| pair[1].at - pair[0].at == Duration::from_secs(1)));

	refresher.shutdown().await;

	Ok(())
}
