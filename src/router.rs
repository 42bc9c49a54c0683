/// Command router: one logical client handle over a master/replica deployment
///
/// Every operation is classified, handed the cached connection of the role it
/// needs, and forwarded verbatim. Replies and errors come back unchanged: no
/// retries, no fallback from a replica to the master.
use crate::config::{DeploymentMode, RouterConfig};
use crate::core::cache::ConnectionCache;
use crate::core::connection::{Connector, NodeConnection, TcpConnector};
use crate::core::resolver::EndpointResolver;
use crate::core::Role;
use crate::discovery::DiscoveryClient;
use crate::error::{ErrorSeverity, RouterResult};
use crate::redis::command::{Command, ScoreBound, SetOptions};
use crate::redis::resp::RespValue;
use bytes::Bytes;
use tracing::{debug, error, info, warn};

pub struct Router<C: Connector> {
    cache: ConnectionCache<C>,
}

impl Router<TcpConnector> {
    /// Router over TCP node connections for a static deployment
    pub fn from_config(config: RouterConfig) -> RouterResult<Self> {
        let connector = TcpConnector::from_config(&config.connection);
        Self::new(config, connector)
    }
}

impl<C: Connector> Router<C> {
    /// Router for a static deployment
    pub fn new(config: RouterConfig, connector: C) -> RouterResult<Self> {
        Self::build(config, connector, None)
    }

    /// Router for a discovered deployment; the configured discovery nodes are
    /// registered on `discovery`
    pub fn with_discovery(
        config: RouterConfig,
        connector: C,
        discovery: Box<dyn DiscoveryClient>,
    ) -> RouterResult<Self> {
        Self::build(config, connector, Some(discovery))
    }

    fn build(
        config: RouterConfig,
        connector: C,
        discovery: Option<Box<dyn DiscoveryClient>>,
    ) -> RouterResult<Self> {
        config.validate()?;
        let resolver = EndpointResolver::from_config(&config, discovery)?;

        info!(
            mode = %config.mode(),
            eviction = ?config.connection.eviction,
            "Router created"
        );

        Ok(Self {
            cache: ConnectionCache::new(connector, resolver, config.connection.eviction),
        })
    }

    pub fn mode(&self) -> DeploymentMode {
        self.cache.resolver().mode()
    }

    pub fn cache(&self) -> &ConnectionCache<C> {
        &self.cache
    }

    /// Switch the logical database on every connection, current and future
    pub async fn select_database(&self, index: u32) -> RouterResult<()> {
        self.cache.select_database(index).await
    }

    /// Drop the cached connection for `role` so the next operation reconnects
    pub async fn invalidate(&self, role: Role) -> bool {
        self.cache.invalidate(role).await
    }

    /// Classify, route and forward one operation
    pub async fn execute(&self, command: Command) -> RouterResult<RespValue> {
        command.validate()?;

        let role = command.role();
        let (name, args) = command.into_parts();
        debug!(command = %name, %role, "Routing command");

        let connection = self.cache.get(role).await?;
        let result = connection.lock().await.execute(&name, &args).await;

        if let Err(e) = &result {
            match e.severity() {
                ErrorSeverity::Critical => error!(command = %name, %role, "Command failed: {}", e),
                ErrorSeverity::Error | ErrorSeverity::Warning => {
                    warn!(command = %name, %role, "Command failed: {}", e)
                }
                ErrorSeverity::Info => debug!(command = %name, %role, "Command failed: {}", e),
            }
            self.cache.report_failure(role, &connection, e).await;
        }

        result
    }

    /// Forward an operation outside the fixed set
    pub async fn raw<N: Into<String>>(&self, name: N, args: Vec<Bytes>) -> RouterResult<RespValue> {
        self.execute(Command::raw(name, args)).await
    }

    pub async fn get<K: Into<String>>(&self, key: K) -> RouterResult<RespValue> {
        self.execute(Command::Get { key: key.into() }).await
    }

    pub async fn set<K: Into<String>, V: Into<Bytes>>(
        &self,
        key: K,
        value: V,
        options: SetOptions,
    ) -> RouterResult<RespValue> {
        self.execute(Command::Set {
            key: key.into(),
            value: value.into(),
            options,
        })
        .await
    }

    pub async fn set_ex<K: Into<String>, V: Into<Bytes>>(
        &self,
        key: K,
        seconds: u64,
        value: V,
    ) -> RouterResult<RespValue> {
        self.execute(Command::SetEx {
            key: key.into(),
            seconds,
            value: value.into(),
        })
        .await
    }

    pub async fn set_nx<K: Into<String>, V: Into<Bytes>>(
        &self,
        key: K,
        value: V,
    ) -> RouterResult<RespValue> {
        self.execute(Command::SetNx {
            key: key.into(),
            value: value.into(),
        })
        .await
    }

    pub async fn expire<K: Into<String>>(&self, key: K, seconds: i64) -> RouterResult<RespValue> {
        self.execute(Command::Expire {
            key: key.into(),
            seconds,
        })
        .await
    }

    pub async fn pexpire<K: Into<String>>(
        &self,
        key: K,
        milliseconds: i64,
    ) -> RouterResult<RespValue> {
        self.execute(Command::PExpire {
            key: key.into(),
            milliseconds,
        })
        .await
    }

    pub async fn expire_at<K: Into<String>>(
        &self,
        key: K,
        timestamp: i64,
    ) -> RouterResult<RespValue> {
        self.execute(Command::ExpireAt {
            key: key.into(),
            timestamp,
        })
        .await
    }

    pub async fn pexpire_at<K: Into<String>>(
        &self,
        key: K,
        timestamp_ms: i64,
    ) -> RouterResult<RespValue> {
        self.execute(Command::PExpireAt {
            key: key.into(),
            timestamp_ms,
        })
        .await
    }

    pub async fn ttl<K: Into<String>>(&self, key: K) -> RouterResult<RespValue> {
        self.execute(Command::Ttl { key: key.into() }).await
    }

    pub async fn del<K: Into<String>>(&self, key: K) -> RouterResult<RespValue> {
        self.execute(Command::Del { key: key.into() }).await
    }

    pub async fn exists<K: Into<String>>(&self, key: K) -> RouterResult<RespValue> {
        self.execute(Command::Exists { key: key.into() }).await
    }

    pub async fn publish<Ch: Into<String>, M: Into<Bytes>>(
        &self,
        channel: Ch,
        message: M,
    ) -> RouterResult<RespValue> {
        self.execute(Command::Publish {
            channel: channel.into(),
            message: message.into(),
        })
        .await
    }

    pub async fn incr<K: Into<String>>(&self, key: K) -> RouterResult<RespValue> {
        self.execute(Command::Incr { key: key.into() }).await
    }

    pub async fn incr_by<K: Into<String>>(&self, key: K, increment: i64) -> RouterResult<RespValue> {
        self.execute(Command::IncrBy {
            key: key.into(),
            increment,
        })
        .await
    }

    pub async fn decr<K: Into<String>>(&self, key: K) -> RouterResult<RespValue> {
        self.execute(Command::Decr { key: key.into() }).await
    }

    pub async fn decr_by<K: Into<String>>(&self, key: K, decrement: i64) -> RouterResult<RespValue> {
        self.execute(Command::DecrBy {
            key: key.into(),
            decrement,
        })
        .await
    }

    pub async fn hget<K: Into<String>, F: Into<String>>(
        &self,
        key: K,
        field: F,
    ) -> RouterResult<RespValue> {
        self.execute(Command::HGet {
            key: key.into(),
            field: field.into(),
        })
        .await
    }

    pub async fn hmget<K: Into<String>>(
        &self,
        key: K,
        fields: Vec<String>,
    ) -> RouterResult<RespValue> {
        self.execute(Command::HMGet {
            key: key.into(),
            fields,
        })
        .await
    }

    pub async fn hgetall<K: Into<String>>(&self, key: K) -> RouterResult<RespValue> {
        self.execute(Command::HGetAll { key: key.into() }).await
    }

    pub async fn hset<K: Into<String>, F: Into<String>, V: Into<Bytes>>(
        &self,
        key: K,
        field: F,
        value: V,
    ) -> RouterResult<RespValue> {
        self.execute(Command::HSet {
            key: key.into(),
            field: field.into(),
            value: value.into(),
        })
        .await
    }

    pub async fn hmset<K: Into<String>>(
        &self,
        key: K,
        pairs: Vec<(String, Bytes)>,
    ) -> RouterResult<RespValue> {
        self.execute(Command::HMSet {
            key: key.into(),
            pairs,
        })
        .await
    }

    pub async fn hexists<K: Into<String>, F: Into<String>>(
        &self,
        key: K,
        field: F,
    ) -> RouterResult<RespValue> {
        self.execute(Command::HExists {
            key: key.into(),
            field: field.into(),
        })
        .await
    }

    pub async fn hkeys<K: Into<String>>(&self, key: K) -> RouterResult<RespValue> {
        self.execute(Command::HKeys { key: key.into() }).await
    }

    pub async fn hdel<K: Into<String>, F: Into<String>>(
        &self,
        key: K,
        field: F,
    ) -> RouterResult<RespValue> {
        self.execute(Command::HDel {
            key: key.into(),
            field: field.into(),
        })
        .await
    }

    pub async fn lpush<K: Into<String>, V: Into<Bytes>>(
        &self,
        key: K,
        value: V,
    ) -> RouterResult<RespValue> {
        self.execute(Command::LPush {
            key: key.into(),
            value: value.into(),
        })
        .await
    }

    pub async fn rpush<K: Into<String>, V: Into<Bytes>>(
        &self,
        key: K,
        value: V,
    ) -> RouterResult<RespValue> {
        self.execute(Command::RPush {
            key: key.into(),
            value: value.into(),
        })
        .await
    }

    pub async fn lpop<K: Into<String>>(&self, key: K) -> RouterResult<RespValue> {
        self.execute(Command::LPop { key: key.into() }).await
    }

    pub async fn rpop<K: Into<String>>(&self, key: K) -> RouterResult<RespValue> {
        self.execute(Command::RPop { key: key.into() }).await
    }

    /// Zero-based, inclusive; negative offsets count from the tail
    pub async fn lrange<K: Into<String>>(
        &self,
        key: K,
        start: i64,
        stop: i64,
    ) -> RouterResult<RespValue> {
        self.execute(Command::LRange {
            key: key.into(),
            start,
            stop,
        })
        .await
    }

    pub async fn ltrim<K: Into<String>>(
        &self,
        key: K,
        start: i64,
        stop: i64,
    ) -> RouterResult<RespValue> {
        self.execute(Command::LTrim {
            key: key.into(),
            start,
            stop,
        })
        .await
    }

    pub async fn llen<K: Into<String>>(&self, key: K) -> RouterResult<RespValue> {
        self.execute(Command::LLen { key: key.into() }).await
    }

    pub async fn sadd<K: Into<String>, M: Into<Bytes>>(
        &self,
        key: K,
        member: M,
    ) -> RouterResult<RespValue> {
        self.execute(Command::SAdd {
            key: key.into(),
            member: member.into(),
        })
        .await
    }

    pub async fn smembers<K: Into<String>>(&self, key: K) -> RouterResult<RespValue> {
        self.execute(Command::SMembers { key: key.into() }).await
    }

    pub async fn srem<K: Into<String>, M: Into<Bytes>>(
        &self,
        key: K,
        member: M,
    ) -> RouterResult<RespValue> {
        self.execute(Command::SRem {
            key: key.into(),
            member: member.into(),
        })
        .await
    }

    pub async fn zadd<K: Into<String>, M: Into<Bytes>>(
        &self,
        key: K,
        score: f64,
        member: M,
    ) -> RouterResult<RespValue> {
        self.execute(Command::ZAdd {
            key: key.into(),
            score,
            member: member.into(),
        })
        .await
    }

    pub async fn zscore<K: Into<String>, M: Into<Bytes>>(
        &self,
        key: K,
        member: M,
    ) -> RouterResult<RespValue> {
        self.execute(Command::ZScore {
            key: key.into(),
            member: member.into(),
        })
        .await
    }

    pub async fn zincrby<K: Into<String>, M: Into<Bytes>>(
        &self,
        key: K,
        increment: f64,
        member: M,
    ) -> RouterResult<RespValue> {
        self.execute(Command::ZIncrBy {
            key: key.into(),
            increment,
            member: member.into(),
        })
        .await
    }

    /// Members by rank, lowest score first
    pub async fn zrange<K: Into<String>>(
        &self,
        key: K,
        start: i64,
        stop: i64,
        with_scores: bool,
    ) -> RouterResult<RespValue> {
        self.execute(Command::ZRange {
            key: key.into(),
            start,
            stop,
            with_scores,
        })
        .await
    }

    /// Members by rank, highest score first
    pub async fn zrevrange<K: Into<String>>(
        &self,
        key: K,
        start: i64,
        stop: i64,
        with_scores: bool,
    ) -> RouterResult<RespValue> {
        self.execute(Command::ZRevRange {
            key: key.into(),
            start,
            stop,
            with_scores,
        })
        .await
    }

    /// Members scored between `max` and `min`, highest first. Plain `f64`
    /// bounds are inclusive.
    pub async fn zrevrangebyscore<K, Max, Min>(
        &self,
        key: K,
        max: Max,
        min: Min,
        with_scores: bool,
    ) -> RouterResult<RespValue>
    where
        K: Into<String>,
        Max: Into<ScoreBound>,
        Min: Into<ScoreBound>,
    {
        self.execute(Command::ZRevRangeByScore {
            key: key.into(),
            max: max.into(),
            min: min.into(),
            with_scores,
        })
        .await
    }

    pub async fn zrevrank<K: Into<String>, M: Into<Bytes>>(
        &self,
        key: K,
        member: M,
    ) -> RouterResult<RespValue> {
        self.execute(Command::ZRevRank {
            key: key.into(),
            member: member.into(),
        })
        .await
    }

    pub async fn zrem<K: Into<String>, M: Into<Bytes>>(
        &self,
        key: K,
        member: M,
    ) -> RouterResult<RespValue> {
        self.execute(Command::ZRem {
            key: key.into(),
            member: member.into(),
        })
        .await
    }

    pub async fn zremrangebyrank<K: Into<String>>(
        &self,
        key: K,
        start: i64,
        stop: i64,
    ) -> RouterResult<RespValue> {
        self.execute(Command::ZRemRangeByRank {
            key: key.into(),
            start,
            stop,
        })
        .await
    }

    pub async fn zremrangebyscore<K, Min, Max>(
        &self,
        key: K,
        min: Min,
        max: Max,
    ) -> RouterResult<RespValue>
    where
        K: Into<String>,
        Min: Into<ScoreBound>,
        Max: Into<ScoreBound>,
    {
        self.execute(Command::ZRemRangeByScore {
            key: key.into(),
            min: min.into(),
            max: max.into(),
        })
        .await
    }

    /// `args` holds the script's KEYS followed by its ARGV
    pub async fn eval<S: Into<String>>(
        &self,
        script: S,
        args: Vec<Bytes>,
        num_keys: usize,
    ) -> RouterResult<RespValue> {
        self.execute(Command::Eval {
            script: script.into(),
            args,
            num_keys,
        })
        .await
    }

    pub async fn evalsha<D: Into<String>>(
        &self,
        digest: D,
        args: Vec<Bytes>,
        num_keys: usize,
    ) -> RouterResult<RespValue> {
        self.execute(Command::EvalSha {
            digest: digest.into(),
            args,
            num_keys,
        })
        .await
    }

    /// SCRIPT LOAD/EXISTS/FLUSH...
    pub async fn script<S: Into<String>, A: Into<String>>(
        &self,
        subcommand: S,
        argument: A,
    ) -> RouterResult<RespValue> {
        self.execute(Command::Script {
            subcommand: subcommand.into(),
            argument: argument.into(),
        })
        .await
    }

    pub async fn keys<P: Into<String>>(&self, pattern: P) -> RouterResult<RespValue> {
        self.execute(Command::Keys {
            pattern: pattern.into(),
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DeploymentConfig, EvictionPolicy};
    use crate::core::Endpoint;
    use crate::discovery::StaticDiscovery;
    use crate::error::RouterError;
    use crate::testing::{Event, MockConnector};
    use std::sync::Arc;

    fn static_config(masters: &[u16], replicas: &[u16]) -> RouterConfig {
        let to_endpoints =
            |ports: &[u16]| ports.iter().map(|p| Endpoint::new("10.0.0.1", *p)).collect();
        RouterConfig {
            password: None,
            deployment: DeploymentConfig::Static {
                masters: to_endpoints(masters),
                replicas: to_endpoints(replicas),
            },
            connection: Default::default(),
        }
    }

    fn static_router(masters: &[u16], replicas: &[u16]) -> (Router<MockConnector>, MockConnector) {
        let connector = MockConnector::new();
        let router = Router::new(static_config(masters, replicas), connector.clone()).unwrap();
        (router, connector)
    }

    fn init_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    }

    const MASTER: &str = "10.0.0.1:6379";
    const REPLICA: &str = "10.0.0.1:6381";

    #[tokio::test]
    async fn test_read_only_operations_use_replica() {
        let (router, connector) = static_router(&[6379], &[6381]);

        router.get("k").await.unwrap();
        router.hget("h", "f").await.unwrap();
        router.hmget("h", vec!["a".to_string(), "b".to_string()]).await.unwrap();
        router.hgetall("h").await.unwrap();
        router.smembers("s").await.unwrap();
        router.zrange("z", 0, -1, true).await.unwrap();
        router.exists("k").await.unwrap();

        for command in ["GET", "HGET", "HMGET", "HGETALL", "SMEMBERS", "ZRANGE", "EXISTS"] {
            assert_eq!(connector.served_by(command).as_deref(), Some(REPLICA), "{}", command);
        }
        assert!(!router.cache().is_cached(Role::Master).await);
    }

    #[tokio::test]
    async fn test_write_operations_use_master() {
        let (router, connector) = static_router(&[6379], &[6381]);

        router.set("k", "v", SetOptions::new()).await.unwrap();
        router.set_ex("k", 10, "v").await.unwrap();
        router.set_nx("k", "v").await.unwrap();
        router.expire("k", 10).await.unwrap();
        router.pexpire("k", 100).await.unwrap();
        router.expire_at("k", 1_700_000_000).await.unwrap();
        router.pexpire_at("k", 1_700_000_000_000).await.unwrap();
        router.ttl("k").await.unwrap();
        router.del("k").await.unwrap();
        router.publish("news", "hello").await.unwrap();
        router.incr("n").await.unwrap();
        router.incr_by("n", 5).await.unwrap();
        router.decr("n").await.unwrap();
        router.decr_by("n", 2).await.unwrap();
        router.hset("h", "f", "v").await.unwrap();
        router
            .hmset("h", vec![("f".to_string(), Bytes::from("v"))])
            .await
            .unwrap();
        router.hexists("h", "f").await.unwrap();
        router.hkeys("h").await.unwrap();
        router.hdel("h", "f").await.unwrap();
        router.lpush("l", "a").await.unwrap();
        router.rpush("l", "b").await.unwrap();
        router.lpop("l").await.unwrap();
        router.rpop("l").await.unwrap();
        router.lrange("l", 0, -1).await.unwrap();
        router.ltrim("l", 0, 10).await.unwrap();
        router.llen("l").await.unwrap();
        router.sadd("s", "m").await.unwrap();
        router.srem("s", "m").await.unwrap();
        router.zadd("z", 1.0, "m").await.unwrap();
        router.zscore("z", "m").await.unwrap();
        router.zincrby("z", 2.0, "m").await.unwrap();
        router.zrevrange("z", 0, -1, false).await.unwrap();
        router.zrevrangebyscore("z", 10.0, 0.0, true).await.unwrap();
        router.zrevrank("z", "m").await.unwrap();
        router.zrem("z", "m").await.unwrap();
        router.zremrangebyrank("z", 0, 1).await.unwrap();
        router.zremrangebyscore("z", 0.0, 5.0).await.unwrap();
        router.eval("return 1", Vec::new(), 0).await.unwrap();
        router
            .evalsha("e0e1f9fabfc9d4800c877a703b823ac0578ff831", Vec::new(), 0)
            .await
            .unwrap();
        router.script("LOAD", "return 1").await.unwrap();
        router.keys("user:*").await.unwrap();

        let executed: Vec<Event> = connector
            .events()
            .into_iter()
            .filter(|event| matches!(event, Event::Execute { .. }))
            .collect();
        assert_eq!(executed.len(), 41);
        assert!(executed.iter().all(|event| event.address() == MASTER));
        assert!(!router.cache().is_cached(Role::Replica).await);
    }

    #[tokio::test]
    async fn test_unknown_operation_defaults_to_master() {
        let (router, connector) = static_router(&[6379], &[6381]);

        router.raw("BITCOUNT", vec![Bytes::from("k")]).await.unwrap();
        assert_eq!(connector.served_by("BITCOUNT").as_deref(), Some(MASTER));

        // Raw names still go through the table
        router.raw("get", vec![Bytes::from("k")]).await.unwrap();
        assert_eq!(connector.served_by("get").as_deref(), Some(REPLICA));
    }

    #[tokio::test]
    async fn test_raw_arguments_forwarded_verbatim() {
        let (router, connector) = static_router(&[6379], &[]);

        let args = vec![Bytes::from("k"), Bytes::from("0"), Bytes::from("-1")];
        router.raw("BITCOUNT", args.clone()).await.unwrap();

        assert!(connector.events().contains(&Event::Execute {
            address: MASTER.to_string(),
            command: "BITCOUNT".to_string(),
            args,
        }));
    }

    #[tokio::test]
    async fn test_reply_returned_unchanged() {
        let (router, _connector) = static_router(&[6379], &[6381]);
        assert_eq!(router.get("k").await.unwrap(), RespValue::bulk(REPLICA));
    }

    #[tokio::test]
    async fn test_empty_replicas_route_reads_to_master_endpoint() {
        let (router, connector) = static_router(&[6379], &[]);

        router.get("k").await.unwrap();
        router.set("k", "v", SetOptions::new()).await.unwrap();

        assert_eq!(connector.served_by("GET").as_deref(), Some(MASTER));
        assert_eq!(connector.served_by("SET").as_deref(), Some(MASTER));
        assert_eq!(
            router.cache().cached_endpoint(Role::Replica).await,
            router.cache().cached_endpoint(Role::Master).await
        );
    }

    #[tokio::test]
    async fn test_select_before_connecting_applies_to_new_connections() {
        let (router, connector) = static_router(&[6379], &[6381]);

        router.select_database(5).await.unwrap();
        router.get("k").await.unwrap();
        router.set("k", "v", SetOptions::new()).await.unwrap();

        for address in [MASTER, REPLICA] {
            let events = connector.events_for(address);
            assert!(matches!(events[0], Event::Connect { .. }), "{:?}", events);
            assert_eq!(
                events[1],
                Event::Select {
                    address: address.to_string(),
                    index: 5
                }
            );
            assert!(matches!(events[2], Event::Execute { .. }));
        }
    }

    #[tokio::test]
    async fn test_select_after_connecting_switches_cached_connections() {
        let (router, connector) = static_router(&[6379], &[6381]);
        router.get("k").await.unwrap();
        router.set("k", "v", SetOptions::new()).await.unwrap();
        connector.clear();

        router.select_database(7).await.unwrap();

        let events = connector.events();
        assert_eq!(events.len(), 2);
        for address in [MASTER, REPLICA] {
            assert!(events.contains(&Event::Select {
                address: address.to_string(),
                index: 7
            }));
        }
        assert!(connector.connects().is_empty());
        assert_eq!(router.cache().selected_database().await, 7);
    }

    #[tokio::test]
    async fn test_repeated_reads_connect_once() {
        let (router, connector) = static_router(&[6379], &[6381]);

        router.get("a").await.unwrap();
        router.get("b").await.unwrap();

        assert_eq!(connector.connects(), vec![REPLICA.to_string()]);
    }

    #[tokio::test]
    async fn test_end_to_end_two_masters_one_replica() {
        init_tracing();
        let (router, connector) = static_router(&[6379, 6380], &[6381]);

        router.get("x").await.unwrap();
        assert_eq!(connector.served_by("GET").as_deref(), Some(REPLICA));

        router.set("x", "1", SetOptions::new()).await.unwrap();
        let master = connector.served_by("SET").unwrap();
        assert!(master == "10.0.0.1:6379" || master == "10.0.0.1:6380");

        router.incr_by("x", 5).await.unwrap();
        assert_eq!(connector.served_by("INCRBY"), Some(master.clone()));

        router.raw("bitcount", vec![Bytes::from("x")]).await.unwrap();
        assert_eq!(connector.served_by("bitcount"), Some(master));

        // The random master pick happens once per cold start
        assert_eq!(connector.connects().len(), 2);
    }

    #[tokio::test]
    async fn test_conflicting_set_options_fail_before_connecting() {
        let (router, connector) = static_router(&[6379], &[6381]);

        let options = SetOptions::new().only_if_absent().only_if_present();
        let err = router.set("k", "v", options).await.unwrap_err();
        assert!(matches!(err, RouterError::InvalidArgument { .. }));
        assert!(connector.events().is_empty());
    }

    #[tokio::test]
    async fn test_set_options_on_the_wire() {
        let (router, connector) = static_router(&[6379], &[]);

        let options = SetOptions::new().only_if_absent().expire_milliseconds(1000);
        router.set("k", "v", options).await.unwrap();

        assert!(connector.events().contains(&Event::Execute {
            address: MASTER.to_string(),
            command: "SET".to_string(),
            args: vec![
                Bytes::from("k"),
                Bytes::from("v"),
                Bytes::from("NX"),
                Bytes::from("PX"),
                Bytes::from("1000"),
            ],
        }));
    }

    #[tokio::test]
    async fn test_open_score_bounds_on_the_wire() {
        let (router, connector) = static_router(&[6379], &[]);

        router
            .zrevrangebyscore("z", ScoreBound::PosInfinity, ScoreBound::Exclusive(5.0), false)
            .await
            .unwrap();
        router
            .zremrangebyscore("z", ScoreBound::NegInfinity, 2.0)
            .await
            .unwrap();

        let events = connector.events();
        assert!(events.contains(&Event::Execute {
            address: MASTER.to_string(),
            command: "ZREVRANGEBYSCORE".to_string(),
            args: vec![Bytes::from("z"), Bytes::from("+inf"), Bytes::from("(5")],
        }));
        assert!(events.contains(&Event::Execute {
            address: MASTER.to_string(),
            command: "ZREMRANGEBYSCORE".to_string(),
            args: vec![Bytes::from("z"), Bytes::from("-inf"), Bytes::from("2")],
        }));
    }

    #[tokio::test]
    async fn test_replica_failure_does_not_fall_back_to_master() {
        let (router, connector) = static_router(&[6379], &[6381]);
        connector.refuse_port(6381);

        let err = router.get("k").await.unwrap_err();
        assert!(matches!(err, RouterError::ConnectionFailed { .. }));
        assert!(connector.connects().is_empty());
        assert!(!router.cache().is_cached(Role::Master).await);
    }

    #[tokio::test]
    async fn test_node_error_propagated_unchanged() {
        let (router, connector) = static_router(&[6379], &[]);
        connector.reject_command("INCR");

        let err = router.incr("k").await.unwrap_err();
        assert!(matches!(
            err,
            RouterError::Node { ref command, ref message } if command == "INCR" && message == "ERR rejected by mock"
        ));

        // Node errors never evict
        assert!(router.cache().is_cached(Role::Master).await);
    }

    #[tokio::test]
    async fn test_default_policy_keeps_broken_connection() {
        let (router, connector) = static_router(&[6379], &[]);
        router.get("k").await.unwrap();

        connector.set_broken(true);
        assert!(router.get("k").await.is_err());
        connector.set_broken(false);

        router.get("k").await.unwrap();
        assert_eq!(connector.connects().len(), 1);
    }

    #[tokio::test]
    async fn test_eviction_policy_reconnects_after_failure() {
        init_tracing();
        let connector = MockConnector::new();
        let mut config = static_config(&[6379], &[]);
        config.connection.eviction = EvictionPolicy::OnConnectionError;
        let router = Router::new(config, connector.clone()).unwrap();

        router.get("k").await.unwrap();
        connector.set_broken(true);
        let err = router.get("k").await.unwrap_err();
        assert!(err.is_connection_error());
        assert!(!router.cache().is_cached(Role::Replica).await);

        connector.set_broken(false);
        router.get("k").await.unwrap();
        assert_eq!(connector.connects().len(), 2);
    }

    #[tokio::test]
    async fn test_invalidate_reresolves() {
        let (router, connector) = static_router(&[6379], &[6381]);
        router.get("k").await.unwrap();

        assert!(router.invalidate(Role::Replica).await);
        router.get("k").await.unwrap();
        assert_eq!(connector.connects(), vec![REPLICA.to_string(), REPLICA.to_string()]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_cold_start_connects_once() {
        let (router, connector) = static_router(&[6379], &[6381]);
        let router = Arc::new(router);

        let tasks: Vec<_> = (0..16)
            .map(|i| {
                let router = Arc::clone(&router);
                tokio::spawn(async move {
                    if i % 2 == 0 {
                        router.get("k").await
                    } else {
                        router.set("k", "v", SetOptions::new()).await
                    }
                })
            })
            .collect();

        for result in futures::future::join_all(tasks).await {
            result.unwrap().unwrap();
        }

        let mut connects = connector.connects();
        connects.sort();
        assert_eq!(connects, vec![MASTER.to_string(), REPLICA.to_string()]);
    }

    #[tokio::test]
    async fn test_password_shared_by_roles() {
        let connector = MockConnector::new();
        let mut config = static_config(&[6379], &[6381]);
        config.password = Some("redispassword".to_string());
        let router = Router::new(config, connector.clone()).unwrap();

        router.get("k").await.unwrap();
        router.del("k").await.unwrap();

        for address in [MASTER, REPLICA] {
            assert!(connector.events().contains(&Event::Authenticate {
                address: address.to_string(),
                password: "redispassword".to_string(),
            }));
        }
    }

    #[test]
    fn test_invalid_config_rejected() {
        let result = Router::new(static_config(&[], &[6381]), MockConnector::new());
        assert!(matches!(result, Err(RouterError::Config(_))));
    }

    fn discovered_config() -> RouterConfig {
        RouterConfig {
            password: Some("secret".to_string()),
            deployment: DeploymentConfig::Discovered {
                service_group: "mymaster".to_string(),
                discovery_nodes: vec![
                    Endpoint::new("127.0.0.1", 5000),
                    Endpoint::new("127.0.0.1", 5001),
                ],
            },
            connection: Default::default(),
        }
    }

    #[tokio::test]
    async fn test_discovered_routing() {
        let discovery = StaticDiscovery::new();
        discovery
            .set_master("mymaster", Endpoint::new("10.0.0.1", 6379))
            .await;
        discovery
            .set_replicas("mymaster", vec![Endpoint::new("10.0.0.1", 6381)])
            .await;

        let connector = MockConnector::new();
        let router =
            Router::with_discovery(discovered_config(), connector.clone(), Box::new(discovery))
                .unwrap();
        assert_eq!(router.mode(), DeploymentMode::Discovered);

        router.get("k").await.unwrap();
        router.set("k", "v", SetOptions::new()).await.unwrap();

        assert_eq!(connector.served_by("GET").as_deref(), Some(REPLICA));
        assert_eq!(connector.served_by("SET").as_deref(), Some(MASTER));
    }

    #[tokio::test]
    async fn test_discovered_without_replicas_reads_from_master() {
        let discovery = StaticDiscovery::new();
        discovery
            .set_master("mymaster", Endpoint::new("10.0.0.1", 6379))
            .await;

        let connector = MockConnector::new();
        let router =
            Router::with_discovery(discovered_config(), connector.clone(), Box::new(discovery))
                .unwrap();

        router.get("k").await.unwrap();
        assert_eq!(connector.served_by("GET").as_deref(), Some(MASTER));
    }

    #[tokio::test]
    async fn test_discovery_unavailable_surfaces() {
        let discovery = StaticDiscovery::new();
        discovery.set_reachable(false);

        let connector = MockConnector::new();
        let router =
            Router::with_discovery(discovered_config(), connector.clone(), Box::new(discovery))
                .unwrap();

        let err = router.get("k").await.unwrap_err();
        assert!(matches!(err, RouterError::DiscoveryUnavailable { .. }));
        assert!(connector.events().is_empty());
    }

    #[test]
    fn test_discovered_mode_requires_client() {
        let result = Router::new(discovered_config(), MockConnector::new());
        assert!(matches!(result, Err(RouterError::Config(_))));
    }

    #[test]
    fn test_tcp_router_from_config() {
        let router = Router::from_config(RouterConfig::default()).unwrap();
        assert_eq!(router.mode(), DeploymentMode::Static);
    }
}
