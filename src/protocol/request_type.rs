//! Request type catalog
//!
//! The closed set of operations the execution core understands. The numeric
//! tag is part of the engine ABI; the command words are what the engine sends
//! to the store. Both come from the single table below so they cannot drift.

use std::fmt;

macro_rules! request_types {
    ($( $variant:ident = $tag:literal => [$($word:literal),*] ),+ $(,)?) => {
        /// Operation selector shared by the client API and the wire encoding
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[repr(u32)]
        pub enum RequestType {
            $( $variant = $tag ),+
        }

        impl RequestType {
            /// Every request type, in tag order
            pub const ALL: &'static [RequestType] = &[$( RequestType::$variant ),+];

            /// Look up a request type by its ABI tag
            pub fn from_tag(tag: u32) -> Option<Self> {
                match tag {
                    $( $tag => Some(RequestType::$variant), )+
                    _ => None,
                }
            }

            /// Store command words this request expands to
            ///
            /// Empty for `CustomCommand`, whose arguments carry the full command.
            pub fn command_words(self) -> &'static [&'static str] {
                match self {
                    $( RequestType::$variant => &[$($word),*], )+
                }
            }
        }
    };
}

request_types! {
    CustomCommand = 1 => [],
    GetString = 2 => ["GET"],
    SetString = 3 => ["SET"],
    Ping = 4 => ["PING"],
    Info = 5 => ["INFO"],
    Del = 6 => ["DEL"],
    Select = 7 => ["SELECT"],
    ConfigGet = 8 => ["CONFIG", "GET"],
    ConfigSet = 9 => ["CONFIG", "SET"],
    ConfigResetStat = 10 => ["CONFIG", "RESETSTAT"],
    ConfigRewrite = 11 => ["CONFIG", "REWRITE"],
    ClientGetName = 12 => ["CLIENT", "GETNAME"],
    ClientGetRedir = 13 => ["CLIENT", "GETREDIR"],
    ClientId = 14 => ["CLIENT", "ID"],
    ClientInfo = 15 => ["CLIENT", "INFO"],
    ClientKill = 16 => ["CLIENT", "KILL"],
    ClientList = 17 => ["CLIENT", "LIST"],
    ClientNoEvict = 18 => ["CLIENT", "NO-EVICT"],
    ClientNoTouch = 19 => ["CLIENT", "NO-TOUCH"],
    ClientPause = 20 => ["CLIENT", "PAUSE"],
    ClientReply = 21 => ["CLIENT", "REPLY"],
    ClientSetInfo = 22 => ["CLIENT", "SETINFO"],
    ClientSetName = 23 => ["CLIENT", "SETNAME"],
    ClientUnblock = 24 => ["CLIENT", "UNBLOCK"],
    ClientUnpause = 25 => ["CLIENT", "UNPAUSE"],
    Expire = 26 => ["EXPIRE"],
    HashSet = 27 => ["HSET"],
    HashGet = 28 => ["HGET"],
    HashDel = 29 => ["HDEL"],
    HashExists = 30 => ["HEXISTS"],
    MGet = 31 => ["MGET"],
    MSet = 32 => ["MSET"],
    Incr = 33 => ["INCR"],
    IncrBy = 34 => ["INCRBY"],
    Decr = 35 => ["DECR"],
    IncrByFloat = 36 => ["INCRBYFLOAT"],
    DecrBy = 37 => ["DECRBY"],
    HashGetAll = 38 => ["HGETALL"],
    HashMSet = 39 => ["HMSET"],
    HashMGet = 40 => ["HMGET"],
    HashIncrBy = 41 => ["HINCRBY"],
    HashIncrByFloat = 42 => ["HINCRBYFLOAT"],
    LPush = 43 => ["LPUSH"],
    LPop = 44 => ["LPOP"],
    RPush = 45 => ["RPUSH"],
    RPop = 46 => ["RPOP"],
    LLen = 47 => ["LLEN"],
    LRem = 48 => ["LREM"],
    LRange = 49 => ["LRANGE"],
    LTrim = 50 => ["LTRIM"],
    SAdd = 51 => ["SADD"],
    SRem = 52 => ["SREM"],
    SMembers = 53 => ["SMEMBERS"],
    SCard = 54 => ["SCARD"],
    PExpireAt = 55 => ["PEXPIREAT"],
    PExpire = 56 => ["PEXPIRE"],
    ExpireAt = 57 => ["EXPIREAT"],
    Exists = 58 => ["EXISTS"],
    Unlink = 59 => ["UNLINK"],
    Ttl = 60 => ["TTL"],
    ZAdd = 61 => ["ZADD"],
    ZRem = 62 => ["ZREM"],
    ZRange = 63 => ["ZRANGE"],
    ZCard = 64 => ["ZCARD"],
    ZCount = 65 => ["ZCOUNT"],
    ZIncrBy = 66 => ["ZINCRBY"],
    ZScore = 67 => ["ZSCORE"],
    Type = 68 => ["TYPE"],
    HLen = 69 => ["HLEN"],
    Echo = 70 => ["ECHO"],
    ZPopMin = 71 => ["ZPOPMIN"],
    Strlen = 72 => ["STRLEN"],
    LIndex = 73 => ["LINDEX"],
    ZPopMax = 74 => ["ZPOPMAX"],
    XRead = 75 => ["XREAD"],
    XAdd = 76 => ["XADD"],
    XReadGroup = 77 => ["XREADGROUP"],
    XAck = 78 => ["XACK"],
    XTrim = 79 => ["XTRIM"],
    XGroupCreate = 80 => ["XGROUP", "CREATE"],
    XGroupDestroy = 81 => ["XGROUP", "DESTROY"],
    HSetNx = 82 => ["HSETNX"],
    SIsMember = 83 => ["SISMEMBER"],
    HVals = 84 => ["HVALS"],
    PTtl = 85 => ["PTTL"],
    ZRemRangeByRank = 86 => ["ZREMRANGEBYRANK"],
    Persist = 87 => ["PERSIST"],
    ZRemRangeByScore = 88 => ["ZREMRANGEBYSCORE"],
    Time = 89 => ["TIME"],
    ZRank = 90 => ["ZRANK"],
    Rename = 91 => ["RENAME"],
    DbSize = 92 => ["DBSIZE"],
    BRPop = 93 => ["BRPOP"],
    HKeys = 94 => ["HKEYS"],
    SPop = 95 => ["SPOP"],
    PfAdd = 96 => ["PFADD"],
    PfCount = 97 => ["PFCOUNT"],
    PfMerge = 98 => ["PFMERGE"],
    BLPop = 100 => ["BLPOP"],
    LInsert = 101 => ["LINSERT"],
    RPushX = 102 => ["RPUSHX"],
    LPushX = 103 => ["LPUSHX"],
    ZMScore = 104 => ["ZMSCORE"],
    ZDiff = 105 => ["ZDIFF"],
    ZDiffStore = 106 => ["ZDIFFSTORE"],
    SetRange = 107 => ["SETRANGE"],
    ZRemRangeByLex = 108 => ["ZREMRANGEBYLEX"],
    ZLexCount = 109 => ["ZLEXCOUNT"],
    Append = 110 => ["APPEND"],
    SUnionStore = 111 => ["SUNIONSTORE"],
    SDiffStore = 112 => ["SDIFFSTORE"],
    SInter = 113 => ["SINTER"],
    SInterStore = 114 => ["SINTERSTORE"],
    ZRangeStore = 115 => ["ZRANGESTORE"],
    GetRange = 116 => ["GETRANGE"],
    SMove = 117 => ["SMOVE"],
    SMIsMember = 118 => ["SMISMEMBER"],
    LastSave = 120 => ["LASTSAVE"],
    GeoAdd = 121 => ["GEOADD"],
    GeoHash = 122 => ["GEOHASH"],
    ObjectEncoding = 123 => ["OBJECT", "ENCODING"],
    HRandField = 124 => ["HRANDFIELD"],
}

impl RequestType {
    /// The ABI tag passed to the execution core
    pub fn tag(self) -> u32 {
        self as u32
    }

    /// Match the leading tokens of a command line against the catalog
    ///
    /// Two-word commands are preferred over one-word prefixes; matching is
    /// ASCII case-insensitive. Returns the request type and how many tokens
    /// were consumed. `CustomCommand` is never matched.
    pub fn parse_command(tokens: &[&str]) -> Option<(Self, usize)> {
        let matches = |words: &[&str]| {
            words.len() <= tokens.len()
                && words
                    .iter()
                    .zip(tokens)
                    .all(|(word, token)| word.eq_ignore_ascii_case(token))
        };

        let mut best: Option<(Self, usize)> = None;
        for &request in Self::ALL {
            let words = request.command_words();
            if words.is_empty() || !matches(words) {
                continue;
            }
            if best.map_or(true, |(_, consumed)| words.len() > consumed) {
                best = Some((request, words.len()));
            }
        }
        best
    }
}

impl TryFrom<u32> for RequestType {
    type Error = u32;

    fn try_from(tag: u32) -> std::result::Result<Self, Self::Error> {
        Self::from_tag(tag).ok_or(tag)
    }
}

impl fmt::Display for RequestType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.command_words() {
            [] => write!(f, "CUSTOM"),
            words => write!(f, "{}", words.join(" ")),
        }
    }
}
