/// Typed store operations and their read/write classification

use crate::core::Role;
use crate::error::{RouterError, RouterResult};
use bytes::Bytes;
use fnv::FnvHashMap;
use lazy_static::lazy_static;
use std::fmt;

/// Whether an operation may be served by a replica
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    ReadOnly,
    ReadWrite,
}

impl Access {
    /// Role whose connection serves operations of this kind
    pub fn role(self) -> Role {
        match self {
            Access::ReadOnly => Role::Replica,
            Access::ReadWrite => Role::Master,
        }
    }
}

/// The only operations sent to a replica
pub const READ_ONLY_COMMANDS: &[&str] =
    &["GET", "HGET", "HMGET", "HGETALL", "SMEMBERS", "ZRANGE", "EXISTS"];

/// Known operations that always go to the master. Some of them only read
/// (TTL, HEXISTS, LRANGE, ZSCORE...) but stay on the master anyway.
pub const READ_WRITE_COMMANDS: &[&str] = &[
    "SET",
    "SETNX",
    "SETEX",
    "EXPIRE",
    "PEXPIRE",
    "EXPIREAT",
    "PEXPIREAT",
    "TTL",
    "DEL",
    "PUBLISH",
    "INCR",
    "INCRBY",
    "DECR",
    "DECRBY",
    "HSET",
    "HMSET",
    "HEXISTS",
    "HKEYS",
    "HDEL",
    "LPUSH",
    "RPUSH",
    "LPOP",
    "RPOP",
    "LRANGE",
    "LTRIM",
    "LLEN",
    "SADD",
    "SREM",
    "ZADD",
    "ZSCORE",
    "ZINCRBY",
    "ZREVRANGE",
    "ZREVRANGEBYSCORE",
    "ZREVRANK",
    "ZREM",
    "ZREMRANGEBYRANK",
    "ZREMRANGEBYSCORE",
    "EVAL",
    "EVALSHA",
    "SCRIPT",
    "KEYS",
];

lazy_static! {
    static ref CLASSIFICATION: FnvHashMap<&'static str, Access> = {
        let mut table = FnvHashMap::default();
        for name in READ_ONLY_COMMANDS {
            table.insert(*name, Access::ReadOnly);
        }
        for name in READ_WRITE_COMMANDS {
            table.insert(*name, Access::ReadWrite);
        }
        table
    };
}

/// Look up an operation name, case-insensitively. Unknown names are ReadWrite.
pub fn classify(name: &str) -> Access {
    let upper = name.to_ascii_uppercase();
    CLASSIFICATION
        .get(upper.as_str())
        .copied()
        .unwrap_or(Access::ReadWrite)
}

/// Whether the name appears in the fixed classification table
pub fn is_known(name: &str) -> bool {
    CLASSIFICATION.contains_key(name.to_ascii_uppercase().as_str())
}

/// Option bag for SET
///
/// ```
/// use rumbo::redis::command::SetOptions;
///
/// let options = SetOptions::new().only_if_absent().expire_seconds(10);
/// assert!(options.validate().is_ok());
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SetOptions {
    pub only_if_absent: bool,
    pub only_if_present: bool,
    pub expire_seconds: Option<u64>,
    pub expire_milliseconds: Option<u64>,
}

impl SetOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// NX
    pub fn only_if_absent(mut self) -> Self {
        self.only_if_absent = true;
        self
    }

    /// XX
    pub fn only_if_present(mut self) -> Self {
        self.only_if_present = true;
        self
    }

    /// EX
    pub fn expire_seconds(mut self, seconds: u64) -> Self {
        self.expire_seconds = Some(seconds);
        self
    }

    /// PX
    pub fn expire_milliseconds(mut self, milliseconds: u64) -> Self {
        self.expire_milliseconds = Some(milliseconds);
        self
    }

    pub fn validate(&self) -> RouterResult<()> {
        if self.only_if_absent && self.only_if_present {
            return Err(RouterError::invalid_argument(
                "SET options only-if-absent and only-if-present are mutually exclusive",
            ));
        }
        Ok(())
    }

    fn append_to(&self, args: &mut Vec<Bytes>) {
        if self.only_if_absent {
            args.push(Bytes::from_static(b"NX"));
        }
        if self.only_if_present {
            args.push(Bytes::from_static(b"XX"));
        }
        if let Some(seconds) = self.expire_seconds {
            args.push(Bytes::from_static(b"EX"));
            args.push(number(seconds));
        }
        if let Some(milliseconds) = self.expire_milliseconds {
            args.push(Bytes::from_static(b"PX"));
            args.push(number(milliseconds));
        }
    }
}

/// One end of a sorted-set score interval
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScoreBound {
    Inclusive(f64),
    /// `(score`
    Exclusive(f64),
    /// `-inf`
    NegInfinity,
    /// `+inf`
    PosInfinity,
}

impl From<f64> for ScoreBound {
    fn from(score: f64) -> Self {
        ScoreBound::Inclusive(score)
    }
}

impl fmt::Display for ScoreBound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScoreBound::Inclusive(score) => write!(f, "{}", score),
            ScoreBound::Exclusive(score) => write!(f, "({}", score),
            ScoreBound::NegInfinity => f.write_str("-inf"),
            ScoreBound::PosInfinity => f.write_str("+inf"),
        }
    }
}

/// A store operation the router knows how to route
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Get { key: String },
    Set { key: String, value: Bytes, options: SetOptions },
    SetEx { key: String, seconds: u64, value: Bytes },
    SetNx { key: String, value: Bytes },
    Expire { key: String, seconds: i64 },
    PExpire { key: String, milliseconds: i64 },
    ExpireAt { key: String, timestamp: i64 },
    PExpireAt { key: String, timestamp_ms: i64 },
    Ttl { key: String },
    Del { key: String },
    Exists { key: String },
    Publish { channel: String, message: Bytes },
    Incr { key: String },
    IncrBy { key: String, increment: i64 },
    Decr { key: String },
    DecrBy { key: String, decrement: i64 },
    HGet { key: String, field: String },
    HMGet { key: String, fields: Vec<String> },
    HGetAll { key: String },
    HSet { key: String, field: String, value: Bytes },
    HMSet { key: String, pairs: Vec<(String, Bytes)> },
    HExists { key: String, field: String },
    HKeys { key: String },
    HDel { key: String, field: String },
    LPush { key: String, value: Bytes },
    RPush { key: String, value: Bytes },
    LPop { key: String },
    RPop { key: String },
    LRange { key: String, start: i64, stop: i64 },
    LTrim { key: String, start: i64, stop: i64 },
    LLen { key: String },
    SAdd { key: String, member: Bytes },
    SMembers { key: String },
    SRem { key: String, member: Bytes },
    ZAdd { key: String, score: f64, member: Bytes },
    ZScore { key: String, member: Bytes },
    ZIncrBy { key: String, increment: f64, member: Bytes },
    ZRange { key: String, start: i64, stop: i64, with_scores: bool },
    ZRevRange { key: String, start: i64, stop: i64, with_scores: bool },
    ZRevRangeByScore { key: String, max: ScoreBound, min: ScoreBound, with_scores: bool },
    ZRevRank { key: String, member: Bytes },
    ZRem { key: String, member: Bytes },
    ZRemRangeByRank { key: String, start: i64, stop: i64 },
    ZRemRangeByScore { key: String, min: ScoreBound, max: ScoreBound },
    /// Script source followed by KEYS then ARGV in `args`
    Eval { script: String, args: Vec<Bytes>, num_keys: usize },
    EvalSha { digest: String, args: Vec<Bytes>, num_keys: usize },
    Script { subcommand: String, argument: String },
    Keys { pattern: String },
    /// Any operation outside the fixed set, forwarded verbatim
    Raw { name: String, args: Vec<Bytes> },
}

impl Command {
    pub fn raw<N: Into<String>>(name: N, args: Vec<Bytes>) -> Self {
        Command::Raw {
            name: name.into(),
            args,
        }
    }

    /// Store command name
    pub fn name(&self) -> &str {
        match self {
            Command::Get { .. } => "GET",
            Command::Set { .. } => "SET",
            Command::SetEx { .. } => "SETEX",
            Command::SetNx { .. } => "SETNX",
            Command::Expire { .. } => "EXPIRE",
            Command::PExpire { .. } => "PEXPIRE",
            Command::ExpireAt { .. } => "EXPIREAT",
            Command::PExpireAt { .. } => "PEXPIREAT",
            Command::Ttl { .. } => "TTL",
            Command::Del { .. } => "DEL",
            Command::Exists { .. } => "EXISTS",
            Command::Publish { .. } => "PUBLISH",
            Command::Incr { .. } => "INCR",
            Command::IncrBy { .. } => "INCRBY",
            Command::Decr { .. } => "DECR",
            Command::DecrBy { .. } => "DECRBY",
            Command::HGet { .. } => "HGET",
            Command::HMGet { .. } => "HMGET",
            Command::HGetAll { .. } => "HGETALL",
            Command::HSet { .. } => "HSET",
            Command::HMSet { .. } => "HMSET",
            Command::HExists { .. } => "HEXISTS",
            Command::HKeys { .. } => "HKEYS",
            Command::HDel { .. } => "HDEL",
            Command::LPush { .. } => "LPUSH",
            Command::RPush { .. } => "RPUSH",
            Command::LPop { .. } => "LPOP",
            Command::RPop { .. } => "RPOP",
            Command::LRange { .. } => "LRANGE",
            Command::LTrim { .. } => "LTRIM",
            Command::LLen { .. } => "LLEN",
            Command::SAdd { .. } => "SADD",
            Command::SMembers { .. } => "SMEMBERS",
            Command::SRem { .. } => "SREM",
            Command::ZAdd { .. } => "ZADD",
            Command::ZScore { .. } => "ZSCORE",
            Command::ZIncrBy { .. } => "ZINCRBY",
            Command::ZRange { .. } => "ZRANGE",
            Command::ZRevRange { .. } => "ZREVRANGE",
            Command::ZRevRangeByScore { .. } => "ZREVRANGEBYSCORE",
            Command::ZRevRank { .. } => "ZREVRANK",
            Command::ZRem { .. } => "ZREM",
            Command::ZRemRangeByRank { .. } => "ZREMRANGEBYRANK",
            Command::ZRemRangeByScore { .. } => "ZREMRANGEBYSCORE",
            Command::Eval { .. } => "EVAL",
            Command::EvalSha { .. } => "EVALSHA",
            Command::Script { .. } => "SCRIPT",
            Command::Keys { .. } => "KEYS",
            Command::Raw { name, .. } => name.as_str(),
        }
    }

    pub fn access(&self) -> Access {
        classify(self.name())
    }

    pub fn role(&self) -> Role {
        self.access().role()
    }

    /// Reject argument combinations that cannot be sent
    pub fn validate(&self) -> RouterResult<()> {
        match self {
            Command::Set { options, .. } => options.validate(),
            Command::Eval { args, num_keys, .. } | Command::EvalSha { args, num_keys, .. } => {
                if *num_keys > args.len() {
                    return Err(RouterError::invalid_argument(format!(
                        "script declares {} keys but only {} arguments were given",
                        num_keys,
                        args.len()
                    )));
                }
                Ok(())
            }
            Command::Raw { name, .. } if name.trim().is_empty() => {
                Err(RouterError::invalid_argument("operation name cannot be empty"))
            }
            _ => Ok(()),
        }
    }

    /// Split into the command name and its wire arguments
    pub fn into_parts(self) -> (String, Vec<Bytes>) {
        let name = self.name().to_string();
        let args = match self {
            Command::Get { key }
            | Command::Ttl { key }
            | Command::Del { key }
            | Command::Exists { key }
            | Command::Incr { key }
            | Command::Decr { key }
            | Command::HGetAll { key }
            | Command::HKeys { key }
            | Command::LPop { key }
            | Command::RPop { key }
            | Command::LLen { key }
            | Command::SMembers { key } => vec![Bytes::from(key)],
            Command::Set {
                key,
                value,
                options,
            } => {
                let mut args = vec![Bytes::from(key), value];
                options.append_to(&mut args);
                args
            }
            Command::SetEx {
                key,
                seconds,
                value,
            } => vec![Bytes::from(key), number(seconds), value],
            Command::SetNx { key, value }
            | Command::LPush { key, value }
            | Command::RPush { key, value } => vec![Bytes::from(key), value],
            Command::Expire { key, seconds: n }
            | Command::PExpire {
                key,
                milliseconds: n,
            }
            | Command::ExpireAt { key, timestamp: n }
            | Command::PExpireAt {
                key,
                timestamp_ms: n,
            }
            | Command::IncrBy { key, increment: n }
            | Command::DecrBy { key, decrement: n } => vec![Bytes::from(key), number(n)],
            Command::Publish { channel, message } => vec![Bytes::from(channel), message],
            Command::HGet { key, field }
            | Command::HExists { key, field }
            | Command::HDel { key, field } => vec![Bytes::from(key), Bytes::from(field)],
            Command::HMGet { key, fields } => std::iter::once(Bytes::from(key))
                .chain(fields.into_iter().map(Bytes::from))
                .collect(),
            Command::HSet { key, field, value } => {
                vec![Bytes::from(key), Bytes::from(field), value]
            }
            Command::HMSet { key, pairs } => {
                let mut args = Vec::with_capacity(1 + pairs.len() * 2);
                args.push(Bytes::from(key));
                for (field, value) in pairs {
                    args.push(Bytes::from(field));
                    args.push(value);
                }
                args
            }
            Command::LRange { key, start, stop }
            | Command::LTrim { key, start, stop }
            | Command::ZRemRangeByRank { key, start, stop } => {
                vec![Bytes::from(key), number(start), number(stop)]
            }
            Command::SAdd { key, member }
            | Command::SRem { key, member }
            | Command::ZScore { key, member }
            | Command::ZRevRank { key, member }
            | Command::ZRem { key, member } => vec![Bytes::from(key), member],
            Command::ZAdd { key, score, member } => vec![Bytes::from(key), number(score), member],
            Command::ZIncrBy {
                key,
                increment,
                member,
            } => vec![Bytes::from(key), number(increment), member],
            Command::ZRange {
                key,
                start,
                stop,
                with_scores,
            }
            | Command::ZRevRange {
                key,
                start,
                stop,
                with_scores,
            } => with_scores_flag(vec![Bytes::from(key), number(start), number(stop)], with_scores),
            Command::ZRevRangeByScore {
                key,
                max,
                min,
                with_scores,
            } => with_scores_flag(vec![Bytes::from(key), number(max), number(min)], with_scores),
            Command::ZRemRangeByScore { key, min, max } => {
                vec![Bytes::from(key), number(min), number(max)]
            }
            Command::Eval {
                script: source,
                args,
                num_keys,
            }
            | Command::EvalSha {
                digest: source,
                args,
                num_keys,
            } => {
                let mut wire = Vec::with_capacity(2 + args.len());
                wire.push(Bytes::from(source));
                wire.push(number(num_keys));
                wire.extend(args);
                wire
            }
            Command::Script {
                subcommand,
                argument,
            } => vec![Bytes::from(subcommand), Bytes::from(argument)],
            Command::Keys { pattern } => vec![Bytes::from(pattern)],
            Command::Raw { args, .. } => args,
        };

        (name, args)
    }
}

fn number<N: ToString>(n: N) -> Bytes {
    Bytes::from(n.to_string())
}

fn with_scores_flag(mut args: Vec<Bytes>, with_scores: bool) -> Vec<Bytes> {
    if with_scores {
        args.push(Bytes::from_static(b"WITHSCORES"));
    }
    args
}
