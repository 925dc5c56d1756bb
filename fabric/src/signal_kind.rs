use num_enum::{IntoPrimitive, TryFromPrimitive};

///
/// 信号id。 u16, 线上契约值。
///
/// 每类信号的inline字长与语义是静态已知的, 见 signaldata 下各定义。
///
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoPrimitive, TryFromPrimitive)]
#[repr(u16)]
pub enum SignalKind {
    /// block自投递的后台继续信号, 携带block内的tag枚举
    ContinueB = 1,

    /// key操作请求: DBTC -> DBLQH。 requestInfo按位打包
    LqhKeyReq = 10,
    LqhKeyConf = 11,
    LqhKeyRef = 12,

    /// 事务协调器对客户端的key操作拒绝
    TcKeyRef = 21,

    /// 索引alter三元组: DBDICT
    AlterIndxReq = 30,
    AlterIndxConf = 31,
    AlterIndxRef = 32,

    /// 索引构建三元组: DBDICT -> DBTUX
    BuildIndxReq = 40,
    BuildIndxConf = 41,
    BuildIndxRef = 42,

    /// 节点失败: QMGR广播
    FailRep = 50,
    NodeFailRep = 51,
    /// block完成节点失败处理的回执
    NfCompleteRep = 52,
}

impl SignalKind {
    /// Req -> Ref 家族映射。
    /// 节点失败、实例缺失、block离线时由派发器合成REF应答。
    pub fn ref_of(&self) -> Option<SignalKind> {
        match self {
            SignalKind::LqhKeyReq => Some(SignalKind::LqhKeyRef),
            SignalKind::AlterIndxReq => Some(SignalKind::AlterIndxRef),
            SignalKind::BuildIndxReq => Some(SignalKind::BuildIndxRef),
            _ => None,
        }
    }

    pub fn is_request(&self) -> bool {
        self.ref_of().is_some()
    }

    pub fn name(&self) -> &'static str {
        match self {
            SignalKind::ContinueB => "CONTINUEB",
            SignalKind::LqhKeyReq => "LQHKEYREQ",
            SignalKind::LqhKeyConf => "LQHKEYCONF",
            SignalKind::LqhKeyRef => "LQHKEYREF",
            SignalKind::TcKeyRef => "TCKEYREF",
            SignalKind::AlterIndxReq => "ALTER_INDX_REQ",
            SignalKind::AlterIndxConf => "ALTER_INDX_CONF",
            SignalKind::AlterIndxRef => "ALTER_INDX_REF",
            SignalKind::BuildIndxReq => "BUILD_INDX_REQ",
            SignalKind::BuildIndxConf => "BUILD_INDX_CONF",
            SignalKind::BuildIndxRef => "BUILD_INDX_REF",
            SignalKind::FailRep => "FAIL_REP",
            SignalKind::NodeFailRep => "NODE_FAIL_REP",
            SignalKind::NfCompleteRep => "NF_COMPLETE_REP",
        }
    }
}
