use common::log::tracing_factory::TracingFactory;
use fabric::block_ref::{BlockRef, DBDICT, DBLQH, DBTC};
use fabric::codec;
use fabric::signal::{LongSection, Signal};
use fabric::signal_kind::SignalKind;
use fabric::signaldata::alter_indx::AlterIndxReq;
use fabric::signaldata::lqh_key::LqhKeyReq;
use fabric::transport::RemoteLink;

fn long_lqh_key_req() -> Signal {
    let mut req = LqhKeyReq::default();
    req.client_connect_ptr = 1001;
    req.hash_value = 0x9E3779B9;
    req.trans_id1 = 7;
    req.trans_id2 = 8;
    LqhKeyReq::set_operation(&mut req.request_info, 2);
    LqhKeyReq::set_rowid_flag(&mut req.request_info, 1);
    let mut sig = req.to_signal(BlockRef::main(DBTC), BlockRef::new(DBLQH, 1)).unwrap();
    sig.attach_section(LongSection::from_slice(&[0x11; 12])).unwrap();
    sig.attach_section(LongSection::from_slice(&[0x22; 20])).unwrap();
    sig
}

#[test]
pub fn test_every_signal_kind_round_trips() {
    TracingFactory::init_log(true);

    let signals = vec![
        long_lqh_key_req(),
        AlterIndxReq {
            client_ref: 0xAB,
            client_data: 1,
            trans_id: 2,
            trans_key: 3,
            request_info: 0,
            index_id: 4,
            index_version: 5,
        }.to_signal(BlockRef::main(DBTC), BlockRef::main(DBDICT)).unwrap(),
        Signal::new(SignalKind::NfCompleteRep, BlockRef::main(DBDICT), BlockRef::main(DBTC), &[0, 1, 3, 2]).unwrap(),
        Signal::new(SignalKind::ContinueB, BlockRef::main(DBDICT), BlockRef::main(DBDICT), &[23]).unwrap(),
    ];

    for sig in signals {
        let bytes = codec::encode(&sig).unwrap();
        let (back, used) = codec::decode(&bytes).unwrap();
        assert_eq!(used, bytes.len());
        assert_eq!(back, sig);
        // encode(decode(bytes)) == bytes
        assert_eq!(codec::encode(&back).unwrap(), bytes);
    }
}

#[test]
pub fn test_decode_rejects_malformed_frames() {
    let bytes = codec::encode(&long_lqh_key_req()).unwrap();

    // 各种截断
    for cut in [0, 4, codec::FRAME_HEADER_LEN - 1, codec::FRAME_HEADER_LEN + 3, bytes.len() - 1] {
        assert!(codec::decode(&bytes[..cut]).is_err(), "cut={} accepted", cut);
    }

    // 字长/段数越界
    let mut bad = bytes.to_vec();
    bad[10] = 30;
    assert!(codec::decode(&bad).is_err());
    let mut bad = bytes.to_vec();
    bad[11] = 9;
    assert!(codec::decode(&bad).is_err());
}

#[test]
pub fn test_remote_link_stream() {
    TracingFactory::init_log(true);

    let s1 = long_lqh_key_req();
    let s2 = Signal::new(SignalKind::FailRep, BlockRef::main(DBTC), BlockRef::main(DBTC), &[3, 4, 0]).unwrap();

    let mut wire: Vec<u8> = Vec::new();
    RemoteLink::send(&mut wire, &s1).unwrap();
    RemoteLink::send(&mut wire, &s2).unwrap();

    let mut cursor = std::io::Cursor::new(wire);
    assert_eq!(RemoteLink::recv(&mut cursor).unwrap().unwrap(), s1);
    assert_eq!(RemoteLink::recv(&mut cursor).unwrap().unwrap(), s2);
    assert!(RemoteLink::recv(&mut cursor).unwrap().is_none());
}
