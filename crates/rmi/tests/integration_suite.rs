//! Integration tests: two registries talking over an in-process connection.

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::OnceLock;
use std::sync::Weak;
use std::sync::atomic::AtomicU32;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::time::Duration;

use rand::Rng;
use rand::seq::SliceRandom;
use rmi::Error;
use rmi::InboundContext;
use rmi::Result;
use rmi::RmiRegistry;
use rmi::SharedInterface;
use rmi_rpc::ConnectionId;
use rmi_rpc::FailureReason;
use rmi_rpc::LocalRpc;
use rmi_rpc::RpcConfig;
use tracing_subscriber::layer::SubscriberExt;

rmi::shared_interface! {
    pub trait Calculator as CalculatorInterface("demo.Calculator") => CalculatorProxy {
        fn add(&self, a: u32, b: u32) -> u32;
        fn divide(&self, a: u32, b: u32) -> u32;
        fn whoami(&self) -> Option<u64>;
        [asynchronous] fn push(&self, n: u32);
        [unreliable] fn ping(&self);
        fn history(&self) -> Vec<u32>;
        fn pings(&self) -> u32;
        fn spawn(&self, name: String) -> u16;
        [asynchronous] fn reject(&self);
        [asynchronous] fn crash(&self);
    }
}

rmi::shared_interface! {
    pub trait Echo as EchoInterface("demo.Echo") => EchoProxy {
        fn echo(&self, text: String) -> String;
    }
}

#[derive(Default)]
struct Calc {
    history: Mutex<Vec<u32>>,
    pings: AtomicU32,
    registry: OnceLock<Weak<RmiRegistry>>,
}

#[async_trait::async_trait]
impl Calculator for Calc {
    async fn add(&self, a: u32, b: u32) -> Result<u32> {
        Ok(a + b)
    }

    async fn divide(&self, a: u32, b: u32) -> Result<u32> {
        a.checked_div(b).ok_or_else(|| Error::failed("division by zero"))
    }

    async fn whoami(&self) -> Result<Option<u64>> {
        Ok(InboundContext::current().map(|conn| conn.0))
    }

    async fn push(&self, n: u32) -> Result<()> {
        self.history.lock().unwrap().push(n);
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        self.pings.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn history(&self) -> Result<Vec<u32>> {
        Ok(self.history.lock().unwrap().clone())
    }

    async fn pings(&self) -> Result<u32> {
        Ok(self.pings.load(Ordering::SeqCst))
    }

    async fn spawn(&self, name: String) -> Result<u16> {
        let registry = self
            .registry
            .get()
            .and_then(Weak::upgrade)
            .ok_or_else(|| Error::failed("no registry"))?;
        let id = registry.share_named::<EchoInterface>(&name, Arc::new(Parrot)).await?;
        Ok(id.0)
    }

    async fn reject(&self) -> Result<()> {
        Err(Error::failed("rejected"))
    }

    async fn crash(&self) -> Result<()> {
        panic!("calculator crashed");
    }
}

struct Parrot;

#[async_trait::async_trait]
impl Echo for Parrot {
    async fn echo(&self, text: String) -> Result<String> {
        Ok(text)
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Counts warnings.
struct WarnCounter(Arc<AtomicUsize>);

impl<S: tracing::Subscriber> tracing_subscriber::Layer<S> for WarnCounter {
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: tracing_subscriber::layer::Context<'_, S>) {
        if *event.metadata().level() == tracing::Level::WARN {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }
}

/// Two registries on the ends of one connection.
fn connected(conn: u64) -> (Arc<RmiRegistry>, Arc<RmiRegistry>) {
    init_tracing();
    let (a, b) = LocalRpc::pair(ConnectionId(conn), RpcConfig::default());
    (RmiRegistry::new(a), RmiRegistry::new(b))
}

/// Waits until the peer's announcement of `name` has arrived.
async fn remote<I: SharedInterface>(registry: &RmiRegistry, name: &str) -> I::Proxy {
    for _ in 0..400 {
        if let Some(proxy) = registry.get_remote_object_named::<I>(name).await.unwrap() {
            return proxy;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("{} was never announced", name);
}

async fn shared_calc(owner: &Arc<RmiRegistry>, name: &str) -> Arc<Calc> {
    let calc = Arc::new(Calc::default());
    let _ = calc.registry.set(Arc::downgrade(owner));
    owner.share_named::<CalculatorInterface>(name, calc.clone()).await.unwrap();
    calc
}

#[tokio::test]
async fn test_round_trip_matches_local_call() -> anyhow::Result<()> {
    let (owner, consumer) = connected(1);
    let calc = shared_calc(&owner, "svc").await;

    let proxy = remote::<CalculatorInterface>(&consumer, "svc").await;
    let remote_sum = proxy.add(2, 40).await?;
    let local_sum = calc.add(2, 40).await?;

    assert_eq!(remote_sum, 42);
    assert_eq!(remote_sum, local_sum);
    Ok(())
}

#[tokio::test]
async fn test_failure_reaches_caller_and_context_is_cleared() -> anyhow::Result<()> {
    let (owner, consumer) = connected(7);
    let calc = shared_calc(&owner, "svc").await;
    let proxy = remote::<CalculatorInterface>(&consumer, "svc").await;

    let err = proxy.divide(1, 0).await.unwrap_err();
    assert_eq!(err, Error::Remote(FailureReason::Failed("division by zero".into())));

    // Inside an inbound call the connection is published; outside it is not.
    assert_eq!(proxy.whoami().await?, Some(7));
    assert_eq!(calc.whoami().await?, None);
    assert_eq!(InboundContext::current(), None);
    Ok(())
}

#[tokio::test]
async fn test_asynchronous_calls_arrive_in_order() -> anyhow::Result<()> {
    let (owner, consumer) = connected(1);
    shared_calc(&owner, "svc").await;
    let proxy = remote::<CalculatorInterface>(&consumer, "svc").await;

    for n in 0..20 {
        proxy.push(n).await?;
    }
    // Synchronous calls on the same channel start after the pushes finished.
    assert_eq!(proxy.history().await?, (0..20).collect::<Vec<u32>>());
    Ok(())
}

#[tokio::test]
async fn test_unreliable_call_is_delivered() -> anyhow::Result<()> {
    let (owner, consumer) = connected(1);
    let calc = shared_calc(&owner, "svc").await;
    let proxy = remote::<CalculatorInterface>(&consumer, "svc").await;

    proxy.ping().await?;

    for _ in 0..200 {
        if calc.pings.load(Ordering::SeqCst) == 1 {
            return Ok(());
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("ping never arrived");
}

#[tokio::test]
async fn test_shared_method_can_share_objects() -> anyhow::Result<()> {
    let (owner, consumer) = connected(1);
    shared_calc(&owner, "svc").await;
    let proxy = remote::<CalculatorInterface>(&consumer, "svc").await;

    let id = proxy.spawn("parrot".into()).await?;
    assert!(id > 1);

    let parrot = remote::<EchoInterface>(&consumer, "parrot").await;
    assert_eq!(parrot.remote().object_id().0, id);
    assert_eq!(parrot.echo("polly".into()).await?, "polly");
    Ok(())
}

#[tokio::test]
async fn test_both_ends_can_share() -> anyhow::Result<()> {
    let (left, right) = connected(1);
    left.share::<EchoInterface>(Arc::new(Parrot)).await?;
    right.share::<CalculatorInterface>(Arc::new(Calc::default())).await?;

    let echo = remote::<EchoInterface>(&right, EchoInterface::NAME).await;
    let calc = remote::<CalculatorInterface>(&left, CalculatorInterface::NAME).await;

    assert_eq!(echo.echo("hi".into()).await?, "hi");
    assert_eq!(calc.add(1, 1).await?, 2);
    Ok(())
}

#[tokio::test]
async fn test_wrong_interface_is_a_type_mismatch() {
    let (owner, consumer) = connected(1);
    owner.share_named::<EchoInterface>("svc", Arc::new(Parrot)).await.unwrap();
    remote::<EchoInterface>(&consumer, "svc").await;

    let err = consumer.get_remote_object_named::<CalculatorInterface>("svc").await.unwrap_err();
    assert!(matches!(err, Error::TypeMismatch { .. }));
}

#[tokio::test]
async fn test_resharing_a_name_faults_the_peer() {
    let (owner, consumer) = connected(1);
    owner.share_named::<EchoInterface>("svc", Arc::new(Parrot)).await.unwrap();
    let first = remote::<EchoInterface>(&consumer, "svc").await;

    // The peer refuses the retraction and then sees the name bound twice.
    owner.share_named::<EchoInterface>("svc", Arc::new(Parrot)).await.unwrap();

    for _ in 0..400 {
        if consumer.fault().is_some() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert!(consumer.fault().is_some());

    // The stale proxy still points at the retired id.
    let err = first.echo("x".into()).await.unwrap_err();
    assert!(matches!(err, Error::Remote(FailureReason::ServiceNotFound(_))));
}

#[tokio::test]
async fn test_concurrent_calls() -> anyhow::Result<()> {
    let (owner, consumer) = connected(1);
    shared_calc(&owner, "svc").await;
    let proxy = remote::<CalculatorInterface>(&consumer, "svc").await;

    let mut inputs: Vec<u32> = (0..64).map(|_| rand::thread_rng().gen_range(0..1000)).collect();
    inputs.shuffle(&mut rand::thread_rng());

    let calls: Vec<_> = inputs
        .iter()
        .map(|&n| {
            let proxy = proxy.clone();
            tokio::spawn(async move { proxy.add(n, 1).await })
        })
        .collect();

    for (call, n) in calls.into_iter().zip(inputs) {
        assert_eq!(call.await??, n + 1);
    }
    Ok(())
}

#[tokio::test]
async fn test_dropped_owner_fails_calls() {
    let (a, b) = LocalRpc::pair(ConnectionId(1), RpcConfig::default());
    let owner = RmiRegistry::new(a.clone());
    let consumer = RmiRegistry::new(b);
    shared_calc(&owner, "svc").await;
    let proxy = remote::<CalculatorInterface>(&consumer, "svc").await;

    drop(owner);
    drop(a);
    tokio::time::sleep(Duration::from_millis(20)).await;

    let err = proxy.add(1, 2).await.unwrap_err();
    assert!(matches!(err, Error::Rpc(rmi_rpc::Error::ConnectionLost(_))), "got {err:?}");
}

#[tokio::test]
async fn test_panicking_method_does_not_stall_channel() -> anyhow::Result<()> {
    let (owner, consumer) = connected(1);
    shared_calc(&owner, "svc").await;
    let proxy = remote::<CalculatorInterface>(&consumer, "svc").await;

    proxy.crash().await?;
    proxy.push(1).await?;
    assert_eq!(proxy.history().await?, vec![1]);

    // Control messages share the default channel with the crashed call.
    consumer.share_named::<EchoInterface>("late", Arc::new(Parrot)).await?;
    let parrot = remote::<EchoInterface>(&owner, "late").await;
    assert_eq!(parrot.echo("still here".into()).await?, "still here");
    Ok(())
}

#[tokio::test]
async fn test_failed_asynchronous_call_is_logged_once() -> anyhow::Result<()> {
    let warnings = Arc::new(AtomicUsize::new(0));
    let subscriber = tracing_subscriber::registry().with(WarnCounter(warnings.clone()));
    let _guard = tracing::subscriber::set_default(subscriber);

    let (a, b) = LocalRpc::pair(ConnectionId(1), RpcConfig::default());
    let (owner, consumer) = (RmiRegistry::new(a), RmiRegistry::new(b));
    shared_calc(&owner, "svc").await;
    let proxy = remote::<CalculatorInterface>(&consumer, "svc").await;

    proxy.reject().await?;
    // Runs after the rejected call on the same channel has finished.
    proxy.history().await?;

    assert_eq!(warnings.load(Ordering::SeqCst), 1);
    Ok(())
}

#[tokio::test]
async fn test_share_after_peer_drops_leaves_nothing_bound() {
    let (a, b) = LocalRpc::pair(ConnectionId(1), RpcConfig::default());
    let owner = RmiRegistry::new(a);
    let consumer = RmiRegistry::new(b.clone());
    owner.share_named::<EchoInterface>("first", Arc::new(Parrot)).await.unwrap();

    drop(consumer);
    drop(b);
    tokio::time::sleep(Duration::from_millis(20)).await;

    let err = owner.share_named::<EchoInterface>("second", Arc::new(Parrot)).await.unwrap_err();
    assert!(matches!(err, Error::Rpc(rmi_rpc::Error::ConnectionLost(_))), "got {err:?}");
    assert!(owner.get_local_object_named::<EchoInterface>("second").await.is_none());
    assert!(owner.get_local_object_named::<EchoInterface>("first").await.is_some());
}
