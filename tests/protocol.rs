use rug::Integer;
use uuid::Uuid;

use braid::artifact::{json_bytes, json_parse, Ballots, Config, ElectionPublicKey, Plaintexts};
use braid::bb::{BulletinBoard, Names};
use braid::elgamal::PublicKey;
use braid::hashing::hash_bytes;
use braid::memory_bb::MemoryBulletinBoard;
use braid::protocol::{run_until_idle, Protocol};
use braid::rug_b::SchnorrGroup;
use braid::signature::RsaKeys;
use braid::statement::{canonical_bytes, BallotsStatement, ConfigStatement};
use braid::symmetric;
use braid::trustee::Trustee;
use braid::util::random_encrypt_ballots;

const ITEMS: u32 = 3;
const BALLOTS: usize = 10;
const RSA_BITS: usize = 1024;

type Board = MemoryBulletinBoard;

struct Harness {
    board: Board,
    protocols: Vec<Protocol<Board>>,
    ballotbox: RsaKeys,
    cast: Vec<Vec<Integer>>,
}

fn trustee_from(keys: RsaKeys, peers: Vec<String>, offline_split: bool) -> Trustee {
    Trustee::new(keys, symmetric::gen_key(), peers, offline_split)
}

/// A clean board with a valid config for 2 trustees and 3 items, all
/// keys mutually trusted.
fn harness(offline_split: bool) -> Harness {
    let t1 = RsaKeys::generate(RSA_BITS).unwrap();
    let t2 = RsaKeys::generate(RSA_BITS).unwrap();
    let ballotbox = RsaKeys::generate(RSA_BITS).unwrap();

    let peers = vec![
        t1.public_pem().to_string(),
        t2.public_pem().to_string(),
        ballotbox.public_pem().to_string(),
    ];
    let group = SchnorrGroup::default_group();
    let cfg = Config {
        id: Uuid::new_v4().to_string(),
        name: "test election".to_string(),
        modulus: group.modulus.to_string(),
        generator: group.generator.to_string(),
        items: ITEMS,
        ballotbox: ballotbox.public_pem().to_string(),
        trustees: vec![t1.public_pem().to_string(), t2.public_pem().to_string()],
    };

    let mut board = Board::new();
    board.add_config(&cfg).unwrap();

    let protocols = vec![
        Protocol::new(trustee_from(t1, peers.clone(), offline_split)),
        Protocol::new(trustee_from(t2, peers, offline_split)),
    ];

    Harness {
        board,
        protocols,
        ballotbox,
        cast: vec![],
    }
}

impl Harness {
    fn step(&mut self, trustee: usize) -> u32 {
        self.protocols[trustee]
            .step(&mut self.board)
            .unwrap()
            .executed
    }

    fn run_until_idle(&mut self) -> u32 {
        let refs: Vec<&Protocol<Board>> = self.protocols.iter().collect();
        run_until_idle(&refs, &mut self.board, 50).unwrap()
    }

    fn config_hash(&self) -> braid::hashing::Hash {
        hash_bytes(&self.board.get(Board::CONFIG).unwrap())
    }

    /// The ballotbox encrypts fresh random plaintexts under each item's
    /// election key and posts the signed ballot sets.
    fn post_ballots(&mut self) {
        let group = SchnorrGroup::default_group();
        let cfg_hash = self.config_hash();
        for item in 1..=ITEMS {
            let pk_bytes = self.board.get(&Board::public_key(item)).unwrap();
            let pk: ElectionPublicKey = json_parse(&pk_bytes, "public key").unwrap();
            let pk = PublicKey::from(&pk.value, &group);

            let (plaintexts, ciphertexts) = random_encrypt_ballots(BALLOTS, &pk);
            self.cast.push(plaintexts);

            let (bytes, hash) = json_bytes(&Ballots { ciphertexts });
            let stmt = BallotsStatement::new(&hash, &cfg_hash, item);
            let sig = self.ballotbox.sign(&canonical_bytes(&stmt));
            self.board.add_ballots(item, bytes, &stmt, &sig).unwrap();
        }
    }

    fn decoded_plaintexts(&self, item: u32) -> Vec<Integer> {
        let bytes = self.board.get(&Board::plaintexts(item)).unwrap();
        let plaintexts: Plaintexts = json_parse(&bytes, "plaintexts").unwrap();

        plaintexts.plaintexts
    }
}

#[test]
fn scenario_config_signatures() {
    let mut h = harness(false);

    assert_eq!(h.step(0), 1);
    assert_eq!(h.step(1), 1);

    let files = h.board.file_set();
    assert!(files.contains(&Board::config_sig(1)));
    assert!(files.contains(&Board::config_sig(2)));
    // no shares yet
    for item in 1..=ITEMS {
        assert!(!files.contains(&Board::share(item, 1)));
        assert!(!files.contains(&Board::share(item, 2)));
    }
}

#[test]
fn scenario_shares() {
    let mut h = harness(false);
    h.step(0);
    h.step(1);

    // one more cycle each: a share per item
    assert_eq!(h.step(0), ITEMS);
    assert_eq!(h.step(1), ITEMS);

    let files = h.board.file_set();
    for item in 1..=ITEMS {
        for auth in 1..=2 {
            assert!(files.contains(&Board::share(item, auth)));
            assert!(files.contains(&Board::share_stmt(item, auth)));
            assert!(files.contains(&Board::share_sig(item, auth)));
        }
    }
}

#[test]
fn scenario_public_key() {
    let mut h = harness(false);
    h.step(0);
    h.step(1);
    h.step(0);
    h.step(1);

    // trustee #1 combines and publishes, then #2 co-signs
    assert_eq!(h.step(0), ITEMS);
    assert_eq!(h.step(1), ITEMS);

    let files = h.board.file_set();
    for item in 1..=ITEMS {
        assert!(files.contains(&Board::public_key(item)));
        assert!(files.contains(&Board::public_key_stmt(item)));
        assert!(files.contains(&Board::public_key_sig(item, 1)));
        assert!(files.contains(&Board::public_key_sig(item, 2)));
    }
}

#[test]
fn scenario_end_to_end() {
    let mut h = harness(false);

    // dkg up to the published election keys
    h.run_until_idle();
    h.post_ballots();
    // mixes, decryptions, plaintexts
    h.run_until_idle();

    let files = h.board.file_set();
    for item in 1..=ITEMS {
        for auth in 1..=2u32 {
            assert!(files.contains(&Board::mix(item, auth)));
            for signer in 1..=2u32 {
                assert!(files.contains(&Board::mix_sig(item, auth, signer)));
            }
            assert!(files.contains(&Board::decryption(item, auth)));
            assert!(files.contains(&Board::plaintexts_sig(item, auth)));
        }
        assert!(files.contains(&Board::plaintexts(item)));

        // the decrypted multiset equals the cast multiset
        let mut decoded = h.decoded_plaintexts(item);
        let mut cast = h.cast[(item - 1) as usize].clone();
        decoded.sort();
        cast.sort();
        assert_eq!(decoded, cast);
    }
    // no errors were posted along the way
    assert!(!files.contains(Board::ERROR));
    assert!(!files.contains(&Board::auth_error(1)));
    assert!(!files.contains(&Board::auth_error(2)));
}

#[test]
fn scenario_end_to_end_offline_split() {
    let mut h = harness(true);

    h.run_until_idle();
    h.post_ballots();
    h.run_until_idle();

    let files = h.board.file_set();
    for item in 1..=ITEMS {
        assert!(files.contains(&Board::plaintexts(item)));
        // pre-shuffle data is erased once the mix is published
        assert!(!files.contains(&Board::perm_data(item, 1)));
        assert!(!files.contains(&Board::perm_data(item, 2)));

        let mut decoded = h.decoded_plaintexts(item);
        let mut cast = h.cast[(item - 1) as usize].clone();
        decoded.sort();
        cast.sort();
        assert_eq!(decoded, cast);
    }
}

#[test]
fn cycle_is_idempotent() {
    let mut h = harness(false);
    h.run_until_idle();
    h.post_ballots();
    h.run_until_idle();

    let before = h.board.file_set();
    assert_eq!(h.step(0), 0);
    assert_eq!(h.step(1), 0);
    assert_eq!(h.board.file_set(), before);
}

#[test]
fn scenario_malformed_ballots() {
    let mut h = harness(false);
    h.run_until_idle();

    // the ballotbox posts garbage for item 1
    h.board
        .put(&[
            (Board::ballots(1), b"[0|0]".to_vec()),
            (Board::ballots_stmt(1), b"[0|0]".to_vec()),
            (Board::ballots_sig(1), b"[0|0]".to_vec()),
        ])
        .unwrap();

    let result1 = h.protocols[0].step(&mut h.board).unwrap();
    assert_eq!(result1.executed, 0);
    assert!(!result1.errors.is_empty());
    assert!(h.board.file_set().contains(&Board::auth_error(1)));

    // the second trustee halts on the posted error
    let result2 = h.protocols[1].step(&mut h.board).unwrap();
    assert!(result2.stopped.is_some());

    // the first trustee is halted from the next cycle on
    let result1 = h.protocols[0].step(&mut h.board).unwrap();
    assert!(result1.stopped.is_some());

    assert!(!h.board.file_set().contains(&Board::plaintexts(1)));
}

#[test]
fn scenario_corrupted_config_statement() {
    let mut h = harness(false);
    let bogus = ConfigStatement::new(&hash_bytes(b"not the config"));
    h.board
        .overwrite(Board::CONFIG_STMT, canonical_bytes(&bogus));

    let result1 = h.protocols[0].step(&mut h.board).unwrap();
    assert_eq!(result1.executed, 0);
    assert!(result1.errors.iter().any(|e| e.contains("statement mismatch")));

    // no config signature from either trustee, no further progress
    let result2 = h.protocols[1].step(&mut h.board).unwrap();
    assert_eq!(result2.executed, 0);

    let files = h.board.file_set();
    assert!(!files.contains(&Board::config_sig(1)));
    assert!(!files.contains(&Board::config_sig(2)));
    for item in 1..=ITEMS {
        assert!(!files.contains(&Board::share(item, 1)));
        assert!(!files.contains(&Board::share(item, 2)));
    }
}

#[test]
fn scenario_untrusted_peer() {
    let t1 = RsaKeys::generate(RSA_BITS).unwrap();
    let t2 = RsaKeys::generate(RSA_BITS).unwrap();
    let ballotbox = RsaKeys::generate(RSA_BITS).unwrap();

    // trustee 1 does not trust trustee 2
    let peers = vec![
        t1.public_pem().to_string(),
        ballotbox.public_pem().to_string(),
    ];
    let group = SchnorrGroup::default_group();
    let cfg = Config {
        id: Uuid::new_v4().to_string(),
        name: "test election".to_string(),
        modulus: group.modulus.to_string(),
        generator: group.generator.to_string(),
        items: 1,
        ballotbox: ballotbox.public_pem().to_string(),
        trustees: vec![t1.public_pem().to_string(), t2.public_pem().to_string()],
    };
    let mut board = Board::new();
    board.add_config(&cfg).unwrap();

    let protocol: Protocol<Board> = Protocol::new(trustee_from(t1, peers, false));

    let result = protocol.step(&mut board).unwrap();
    assert_eq!(result.executed, 0);
    assert!(result
        .errors
        .iter()
        .any(|e| e.contains("peer set")));
    assert!(board.file_set().contains(&Board::auth_error(1)));

    // halted by the global rule from now on
    let result = protocol.step(&mut board).unwrap();
    assert!(result.stopped.is_some());
}

#[test]
fn pause_halts_the_cycle() {
    let mut h = harness(false);
    h.board.add_pause().unwrap();

    let result = h.protocols[0].step(&mut h.board).unwrap();
    assert_eq!(result.executed, 0);
    assert!(result.stopped.is_some());
    assert!(!h.board.file_set().contains(&Board::config_sig(1)));
}

#[test]
fn error_clearance_is_manual() {
    let mut h = harness(false);
    h.board.add_error("induced failure", 2).unwrap();

    let result = h.protocols[0].step(&mut h.board).unwrap();
    assert!(result.stopped.is_some());

    // out-of-band removal resumes the protocol
    h.board.remove(&Board::auth_error(2));
    let result = h.protocols[0].step(&mut h.board).unwrap();
    assert_eq!(result.executed, 1);
    assert!(h.board.file_set().contains(&Board::config_sig(1)));
}
