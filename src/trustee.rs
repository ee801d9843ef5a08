use std::collections::HashMap;

use log::{info, warn};
use rug::Integer;

use crate::action::{Action, Outcome};
use crate::artifact::{
    json_bytes, json_parse, Ballots, Config, ElectionPublicKey, Mix, PartialDecryption,
    Plaintexts, Share,
};
use crate::bb::BulletinBoard;
use crate::elgamal::{Ciphertext, PrivateKey, PublicKey};
use crate::error::TrusteeError;
use crate::group::Group;
use crate::hashing::{combine_hashes, hash_bytes, Hash};
use crate::keymaker::Keymaker;
use crate::position::{decryptor, mix_position, trustee_at_position};
use crate::rug_b::SchnorrGroup;
use crate::shuffler::Shuffler;
use crate::signature::{normalize_pem, RsaKeys, RsaVerifier};
use crate::statement::{
    canonical_bytes, BallotsStatement, ConfigStatement, DecryptionStatement, MixStatement,
    PlaintextsStatement, PublicKeyStatement, ShareStatement,
};
use crate::symmetric;
use crate::util::short;

/// A stateless protocol actor. Everything it knows about the election
/// is re-derived from the board on every action; the only local state
/// is its key material and trust policy.
pub struct Trustee {
    pub keys: RsaKeys,
    pub symmetric: symmetric::Key,
    pub peers: Vec<String>,
    pub offline_split: bool,
}

/// The approved configuration every action re-validates before doing
/// any cryptography, so all work is bound to a config this trustee has
/// signed.
pub struct ConfigContext {
    pub cfg: Config,
    pub cfg_hash: Hash,
    pub group: SchnorrGroup,
    pub trustee_keys: Vec<RsaVerifier>,
    pub ballotbox_key: RsaVerifier,
    pub self_pos: u32,
    pub n: u32,
}

impl ConfigContext {
    fn trustee_key(&self, auth: u32) -> &RsaVerifier {
        &self.trustee_keys[(auth - 1) as usize]
    }
}

/// Reduces the set of personally verified `(parent, mix)` edges to the
/// tip of a linear chain rooted at `ballots_hash`. Any break, fork or
/// leftover edge is a chain failure.
pub fn reduce_chain(edges: &[(Hash, Hash)], ballots_hash: &Hash) -> Result<Hash, TrusteeError> {
    let mut by_parent: HashMap<Hash, Hash> = HashMap::new();
    for (parent, mix) in edges {
        if by_parent.insert(*parent, *mix).is_some() {
            return Err(TrusteeError::ChainFailure(format!(
                "duplicate parent {}",
                short(parent)
            )));
        }
    }

    let mut current = *ballots_hash;
    for _ in 0..edges.len() {
        current = by_parent.remove(&current).ok_or_else(|| {
            TrusteeError::ChainFailure(format!("chain breaks at {}", short(&current)))
        })?;
    }

    Ok(current)
}

impl Trustee {
    pub fn new(
        keys: RsaKeys,
        symmetric: symmetric::Key,
        peers: Vec<String>,
        offline_split: bool,
    ) -> Trustee {
        let peers = peers.iter().map(|p| normalize_pem(p)).collect();

        Trustee {
            keys,
            symmetric,
            peers,
            offline_split,
        }
    }

    pub fn public_pem(&self) -> &str {
        self.keys.public_pem()
    }

    pub fn execute<B: BulletinBoard>(
        &self,
        action: &Action,
        board: &mut B,
    ) -> Result<Outcome, TrusteeError> {
        info!(">> Action: {:?}", action);
        let ret = match action {
            Action::Stop(msg) => return Ok(Outcome::Stop(msg.clone())),
            Action::ValidateConfig => self.validate_config(board),
            Action::AddShare(item) => self.add_share(board, *item),
            Action::AddOrSignPublicKey(item) => self.add_or_sign_public_key(board, *item),
            Action::AddPreShuffleData(item) => self.add_pre_shuffle_data(&*board, *item),
            Action::AddMix(item) => self.add_mix(board, *item),
            Action::VerifyMix(item, auth) => self.verify_mix(board, *item, *auth),
            Action::AddDecryption(item) => self.add_decryption(board, *item),
            Action::AddOrSignPlaintexts(item) => self.add_or_sign_plaintexts(board, *item),
        };
        match &ret {
            Ok(()) => info!(">> OK"),
            Err(e) => warn!(">> failed: {}", e),
        }

        ret.map(|_| Outcome::Ok)
    }

    /// Loads and fully re-validates the published configuration triple,
    /// including this trustee's own signature on it.
    pub fn valid_context<B: BulletinBoard>(
        &self,
        board: &B,
    ) -> Result<ConfigContext, TrusteeError> {
        let cfg_bytes = board
            .get(B::CONFIG)
            .ok_or_else(|| TrusteeError::Configuration("no config on the board".to_string()))?;
        let cfg: Config = serde_json::from_slice(&cfg_bytes)
            .map_err(|e| TrusteeError::Configuration(format!("unparseable config: {}", e)))?;
        let cfg_hash = hash_bytes(&cfg_bytes);

        let stmt_bytes = board
            .get(B::CONFIG_STMT)
            .ok_or_else(|| TrusteeError::Configuration("no config statement".to_string()))?;
        let recomputed = canonical_bytes(&ConfigStatement::new(&cfg_hash));
        if recomputed != stmt_bytes {
            return Err(TrusteeError::StatementMismatch(
                "config statement does not match the published config".to_string(),
            ));
        }

        let self_pos = cfg.position_of(self.public_pem());
        if self_pos == 0 {
            return Err(TrusteeError::Configuration(
                "this trustee is not listed in the config".to_string(),
            ));
        }

        let own_sig = board.get_bytes(&B::config_sig(self_pos))?;
        self.keys
            .verifier
            .verify(&stmt_bytes, &own_sig)
            .map_err(|_| {
                TrusteeError::SignatureFailure(
                    "own signature on the config statement does not verify".to_string(),
                )
            })?;

        let group = cfg.group()?;
        let trustee_keys = cfg
            .trustees
            .iter()
            .map(|pem| RsaVerifier::from_pem(pem))
            .collect::<Result<Vec<RsaVerifier>, TrusteeError>>()?;
        let ballotbox_key = RsaVerifier::from_pem(&cfg.ballotbox)?;
        let n = cfg.trustee_count();

        Ok(ConfigContext {
            cfg,
            cfg_hash,
            group,
            trustee_keys,
            ballotbox_key,
            self_pos,
            n,
        })
    }

    /// Checks the published config against this trustee's trust policy
    /// and signs its statement on success. Runs once per trustee.
    fn validate_config<B: BulletinBoard>(&self, board: &mut B) -> Result<(), TrusteeError> {
        let cfg_bytes = board
            .get(B::CONFIG)
            .ok_or_else(|| TrusteeError::Configuration("no config on the board".to_string()))?;
        let cfg: Config = serde_json::from_slice(&cfg_bytes)
            .map_err(|e| TrusteeError::Configuration(format!("unparseable config: {}", e)))?;
        let cfg_hash = hash_bytes(&cfg_bytes);

        if cfg.trustees.len() < 2 {
            return Err(TrusteeError::Validation(format!(
                "at least 2 trustees required, config lists {}",
                cfg.trustees.len()
            )));
        }
        let normalized: Vec<String> = cfg.trustees.iter().map(|t| normalize_pem(t)).collect();
        for (i, pem) in normalized.iter().enumerate() {
            if normalized[i + 1..].contains(pem) {
                return Err(TrusteeError::Validation(
                    "duplicate trustee public key in config".to_string(),
                ));
            }
        }

        let self_pos = cfg.position_of(self.public_pem());
        if self_pos == 0 {
            return Err(TrusteeError::Configuration(
                "this trustee is not listed in the config".to_string(),
            ));
        }

        for pem in &normalized {
            if !self.peers.contains(pem) {
                return Err(TrusteeError::Validation(
                    "config lists a trustee key outside this trustee's peer set".to_string(),
                ));
            }
        }
        if !self.peers.contains(&normalize_pem(&cfg.ballotbox)) {
            return Err(TrusteeError::Validation(
                "ballotbox key is outside this trustee's peer set".to_string(),
            ));
        }

        let stmt_bytes = board.get_bytes(B::CONFIG_STMT)?;
        let recomputed = canonical_bytes(&ConfigStatement::new(&cfg_hash));
        if recomputed != stmt_bytes {
            return Err(TrusteeError::StatementMismatch(
                "config statement does not match the published config".to_string(),
            ));
        }

        let sig = self.keys.sign(&stmt_bytes);
        board.add_config_sig(self_pos, &sig)?;
        info!(
            "config {} validated and signed as trustee [{}]",
            short(&cfg_hash),
            self_pos
        );

        Ok(())
    }

    /// Creates a fresh key share for the item: public part with proof
    /// of knowledge on the board, private part wrapped under the master
    /// key. The proof domain is this trustee's RSA modulus.
    fn add_share<B: BulletinBoard>(&self, board: &mut B, item: u32) -> Result<(), TrusteeError> {
        let ctx = self.valid_context(board)?;
        let keymaker: Keymaker<Integer, SchnorrGroup> = Keymaker::gen(&ctx.group);
        let (share_value, proof) =
            keymaker.share(&self.keys.verifier.modulus_bytes());
        let encrypted_sk = keymaker.get_encrypted_sk(&self.symmetric)?;

        let share = Share {
            share: share_value,
            proof,
            encrypted_sk,
        };
        let (share_bytes, share_hash) = json_bytes(&share);
        let stmt = ShareStatement::new(&share_hash, &ctx.cfg_hash, item);
        let sig = self.keys.sign(&canonical_bytes(&stmt));
        board.add_share(item, ctx.self_pos, share_bytes, &stmt, &sig)?;

        Ok(())
    }

    /// Loads and verifies every trustee's share for the item.
    fn verified_shares<B: BulletinBoard>(
        &self,
        board: &B,
        ctx: &ConfigContext,
        item: u32,
    ) -> Result<(Vec<Share>, Vec<Hash>), TrusteeError> {
        let mut shares = Vec::with_capacity(ctx.n as usize);
        let mut hashes = Vec::with_capacity(ctx.n as usize);

        for auth in 1..=ctx.n {
            let share_bytes = board.get_bytes(&B::share(item, auth))?;
            let share: Share = json_parse(&share_bytes, "share")?;
            let share_hash = hash_bytes(&share_bytes);

            let stmt_bytes = board.get_bytes(&B::share_stmt(item, auth))?;
            let recomputed =
                canonical_bytes(&ShareStatement::new(&share_hash, &ctx.cfg_hash, item));
            if recomputed != stmt_bytes {
                return Err(TrusteeError::StatementMismatch(format!(
                    "share statement of trustee [{}] item [{}]",
                    auth, item
                )));
            }
            let sig = board.get_bytes(&B::share_sig(item, auth))?;
            ctx.trustee_key(auth).verify(&stmt_bytes, &sig)?;

            let label = ctx.trustee_key(auth).modulus_bytes();
            if !Keymaker::verify_share(&ctx.group, &share.share, &share.proof, &label) {
                return Err(TrusteeError::ProofFailure(format!(
                    "share proof of knowledge of trustee [{}] item [{}]",
                    auth, item
                )));
            }

            shares.push(share);
            hashes.push(share_hash);
        }

        Ok((shares, hashes))
    }

    /// Combines all shares into the election key. Trustee #1 publishes
    /// it; everyone else re-derives, compares and co-signs.
    fn add_or_sign_public_key<B: BulletinBoard>(
        &self,
        board: &mut B,
        item: u32,
    ) -> Result<(), TrusteeError> {
        let ctx = self.valid_context(board)?;
        let (shares, share_hashes) = self.verified_shares(board, &ctx, item)?;
        let shares_hash = combine_hashes(&share_hashes);

        let values: Vec<Integer> = shares.into_iter().map(|s| s.share).collect();
        let pk_value = Keymaker::<Integer, SchnorrGroup>::combine_shares(&ctx.group, &values);
        let (pk_bytes, pk_hash) = json_bytes(&ElectionPublicKey { value: pk_value });

        if ctx.self_pos == 1 && board.get(&B::public_key(item)).is_none() {
            let stmt = PublicKeyStatement::new(&pk_hash, &shares_hash, &ctx.cfg_hash, item);
            let sig = self.keys.sign(&canonical_bytes(&stmt));
            board.add_public_key(item, ctx.self_pos, pk_bytes, &stmt, &sig)?;
            info!("published public key {} for item [{}]", short(&pk_hash), item);
        } else {
            let posted_bytes = board.get_bytes(&B::public_key(item))?;
            if hash_bytes(&posted_bytes) != pk_hash {
                return Err(TrusteeError::StatementMismatch(format!(
                    "posted public key for item [{}] differs from locally derived key",
                    item
                )));
            }
            let stmt_bytes = board.get_bytes(&B::public_key_stmt(item))?;
            let recomputed = canonical_bytes(&PublicKeyStatement::new(
                &pk_hash,
                &shares_hash,
                &ctx.cfg_hash,
                item,
            ));
            if recomputed != stmt_bytes {
                return Err(TrusteeError::StatementMismatch(format!(
                    "public key statement for item [{}]",
                    item
                )));
            }
            let sig = self.keys.sign(&stmt_bytes);
            board.add_public_key_sig(item, ctx.self_pos, &sig)?;
        }

        Ok(())
    }

    fn load_public_key<B: BulletinBoard>(
        &self,
        board: &B,
        ctx: &ConfigContext,
        item: u32,
    ) -> Result<PublicKey<Integer, SchnorrGroup>, TrusteeError> {
        let bytes = board.get_bytes(&B::public_key(item))?;
        let pk: ElectionPublicKey = json_parse(&bytes, "public key")?;

        Ok(PublicKey::from(&pk.value, &ctx.group))
    }

    /// Loads the ballots triple, checking the statement and the
    /// ballotbox signature.
    fn verified_ballots<B: BulletinBoard>(
        &self,
        board: &B,
        ctx: &ConfigContext,
        item: u32,
    ) -> Result<(Ballots, Hash), TrusteeError> {
        let bytes = board.get_bytes(&B::ballots(item))?;
        let ballots: Ballots = json_parse(&bytes, "ballots")?;
        let ballots_hash = hash_bytes(&bytes);

        let stmt_bytes = board.get_bytes(&B::ballots_stmt(item))?;
        let recomputed =
            canonical_bytes(&BallotsStatement::new(&ballots_hash, &ctx.cfg_hash, item));
        if recomputed != stmt_bytes {
            return Err(TrusteeError::StatementMismatch(format!(
                "ballots statement for item [{}]",
                item
            )));
        }
        let sig = board.get_bytes(&B::ballots_sig(item))?;
        ctx.ballotbox_key.verify(&stmt_bytes, &sig)?;

        Ok((ballots, ballots_hash))
    }

    fn load_mix_statement<B: BulletinBoard>(
        &self,
        board: &B,
        item: u32,
        auth: u32,
    ) -> Result<(MixStatement, Vec<u8>), TrusteeError> {
        let stmt_bytes = board.get_bytes(&B::mix_stmt(item, auth))?;
        let stmt: MixStatement = json_parse(&stmt_bytes, "mix statement")?;

        Ok((stmt, stmt_bytes))
    }

    /// The votes feeding the mix at `position`: the ballots for the
    /// first position, the previous trustee's self-signed mix otherwise.
    fn verified_parent<B: BulletinBoard>(
        &self,
        board: &B,
        ctx: &ConfigContext,
        item: u32,
        position: u32,
    ) -> Result<(Vec<Ciphertext<Integer>>, Hash), TrusteeError> {
        if position == 1 {
            let (ballots, hash) = self.verified_ballots(board, ctx, item)?;
            Ok((ballots.ciphertexts, hash))
        } else {
            let prev = trustee_at_position(position - 1, item, ctx.n);
            let mix_bytes = board.get_bytes(&B::mix(item, prev))?;
            let (mix, mix_hash) = Mix::from_bytes(&mix_bytes)?;

            let (stmt, stmt_bytes) = self.load_mix_statement(board, item, prev)?;
            if stmt.mix_hash != mix_hash.to_vec()
                || stmt.config_hash != ctx.cfg_hash.to_vec()
                || stmt.item != item
                || stmt.auth != prev
            {
                return Err(TrusteeError::StatementMismatch(format!(
                    "mix statement of trustee [{}] item [{}]",
                    prev, item
                )));
            }
            let self_sig = board.get_bytes(&B::mix_sig(item, prev, prev))?;
            ctx.trustee_key(prev).verify(&stmt_bytes, &self_sig)?;

            Ok((mix.mixed_ballots, mix_hash))
        }
    }

    /// Offline phase of the shuffle: precompute the permutation and its
    /// commitments, keep them strictly local. Safe to run concurrently
    /// across items.
    pub(crate) fn add_pre_shuffle_data<B: BulletinBoard>(
        &self,
        board: &B,
        item: u32,
    ) -> Result<(), TrusteeError> {
        let ctx = self.valid_context(board)?;
        let (ballots, _) = self.verified_ballots(board, &ctx, item)?;
        let count = ballots.ciphertexts.len();

        let pk = self.load_public_key(board, &ctx, item)?;
        let generators = ctx.group.generators(count + 1, item, ctx.cfg.id.as_bytes());
        let exp_hasher = &*ctx.group.exp_hasher();
        let shuffler = Shuffler {
            pk: &pk,
            generators: &generators,
            hasher: exp_hasher,
        };

        let perm_data = shuffler.gen_perm_data(count);
        board.add_perm_data_local(item, ctx.self_pos, perm_data);
        info!(
            "precomputed shuffle data for item [{}] ({} ciphertexts)",
            item, count
        );

        Ok(())
    }

    /// Produces this trustee's mix for the item, consuming local
    /// pre-shuffle data when the offline split is enabled.
    fn add_mix<B: BulletinBoard>(&self, board: &mut B, item: u32) -> Result<(), TrusteeError> {
        let ctx = self.valid_context(board)?;
        let position = mix_position(ctx.self_pos, item, ctx.n);
        let (parent_votes, parent_hash) = self.verified_parent(board, &ctx, item, position)?;

        let pk = self.load_public_key(board, &ctx, item)?;
        let generators = ctx
            .group
            .generators(parent_votes.len() + 1, item, ctx.cfg.id.as_bytes());
        let exp_hasher = &*ctx.group.exp_hasher();
        let shuffler = Shuffler {
            pk: &pk,
            generators: &generators,
            hasher: exp_hasher,
        };

        let perm_data = board
            .get_perm_data_local(item, ctx.self_pos)
            .filter(|data| self.offline_split && data.permutation.len() == parent_votes.len())
            .unwrap_or_else(|| shuffler.gen_perm_data(parent_votes.len()));

        let (e_primes, rs) = shuffler.apply_permutation(&parent_votes, &perm_data.permutation);
        let proof = shuffler.gen_proof(&parent_votes, &e_primes, &rs, &perm_data);
        let mix = Mix {
            mixed_ballots: e_primes,
            proof,
        };
        let (mix_bytes, mix_hash) = mix.to_bytes()?;
        info!(
            "mixed item [{}] at position [{}]: {} from parent {}",
            item,
            position,
            short(&mix_hash),
            short(&parent_hash)
        );

        let stmt = MixStatement::new(&mix_hash, &parent_hash, &ctx.cfg_hash, item, ctx.self_pos);
        let sig = self.keys.sign(&canonical_bytes(&stmt));
        board.add_mix(item, ctx.self_pos, mix_bytes, &stmt, &sig)?;
        board.rm_perm_data_local(item, ctx.self_pos);

        Ok(())
    }

    /// Verifies another trustee's mix against its parent votes and
    /// co-signs its statement.
    fn verify_mix<B: BulletinBoard>(
        &self,
        board: &mut B,
        item: u32,
        auth: u32,
    ) -> Result<(), TrusteeError> {
        let ctx = self.valid_context(board)?;
        let position = mix_position(auth, item, ctx.n);

        let mix_bytes = board.get_bytes(&B::mix(item, auth))?;
        let (mix, mix_hash) = Mix::from_bytes(&mix_bytes)?;
        let (parent_votes, parent_hash) = self.verified_parent(board, &ctx, item, position)?;

        let stmt_bytes = board.get_bytes(&B::mix_stmt(item, auth))?;
        let recomputed = canonical_bytes(&MixStatement::new(
            &mix_hash,
            &parent_hash,
            &ctx.cfg_hash,
            item,
            auth,
        ));
        if recomputed != stmt_bytes {
            return Err(TrusteeError::StatementMismatch(format!(
                "mix statement of trustee [{}] item [{}]",
                auth, item
            )));
        }
        let self_sig = board.get_bytes(&B::mix_sig(item, auth, auth))?;
        ctx.trustee_key(auth).verify(&stmt_bytes, &self_sig)?;

        let pk = self.load_public_key(board, &ctx, item)?;
        let generators = ctx
            .group
            .generators(parent_votes.len() + 1, item, ctx.cfg.id.as_bytes());
        let exp_hasher = &*ctx.group.exp_hasher();
        let shuffler = Shuffler {
            pk: &pk,
            generators: &generators,
            hasher: exp_hasher,
        };
        if !shuffler.check_proof(&mix.proof, &parent_votes, &mix.mixed_ballots) {
            return Err(TrusteeError::ProofFailure(format!(
                "shuffle proof of trustee [{}] item [{}]",
                auth, item
            )));
        }
        info!(
            "verified mix {} of trustee [{}] item [{}]",
            short(&mix_hash),
            auth,
            item
        );

        let sig = self.keys.sign(&stmt_bytes);
        board.add_mix_sig(item, auth, ctx.self_pos, &sig)?;

        Ok(())
    }

    /// The privacy-critical gate. Partial decryption happens only if
    /// the personally signed mix statements close a linear chain from
    /// the ballotbox output through every trustee's mix.
    fn add_decryption<B: BulletinBoard>(
        &self,
        board: &mut B,
        item: u32,
    ) -> Result<(), TrusteeError> {
        let ctx = self.valid_context(board)?;

        let mut edges: Vec<(Hash, Hash)> = Vec::with_capacity(ctx.n as usize);
        for auth in 1..=ctx.n {
            let (stmt, stmt_bytes) = self.load_mix_statement(board, item, auth)?;
            if stmt.item != item || stmt.auth != auth || stmt.config_hash != ctx.cfg_hash.to_vec()
            {
                return Err(TrusteeError::StatementMismatch(format!(
                    "mix statement of trustee [{}] item [{}]",
                    auth, item
                )));
            }
            // only statements this trustee has signed itself, hence
            // personally verified, may enter the chain
            let own_sig = board.get_bytes(&B::mix_sig(item, auth, ctx.self_pos))?;
            self.keys.verifier.verify(&stmt_bytes, &own_sig).map_err(|_| {
                TrusteeError::SignatureFailure(format!(
                    "own signature on mix of trustee [{}] item [{}] does not verify",
                    auth, item
                ))
            })?;

            let parent: Hash = stmt.parent_hash.as_slice().try_into().map_err(|_| {
                TrusteeError::Malformed("parent hash has wrong length".to_string())
            })?;
            let mix: Hash = stmt.mix_hash.as_slice().try_into().map_err(|_| {
                TrusteeError::Malformed("mix hash has wrong length".to_string())
            })?;
            edges.push((parent, mix));
        }

        let (_, ballots_hash) = self.verified_ballots(board, &ctx, item)?;
        let tip = reduce_chain(&edges, &ballots_hash)?;

        let final_mixer = trustee_at_position(ctx.n, item, ctx.n);
        let mix_bytes = board.get_bytes(&B::mix(item, final_mixer))?;
        let (final_mix, final_hash) = Mix::from_bytes(&mix_bytes)?;
        if final_hash != tip {
            return Err(TrusteeError::ChainFailure(format!(
                "chain tip {} does not match the final mix {}",
                short(&tip),
                short(&final_hash)
            )));
        }
        info!(
            "mix chain for item [{}] closed: {} -> {}",
            item,
            short(&ballots_hash),
            short(&tip)
        );

        let share_bytes = board.get_bytes(&B::share(item, ctx.self_pos))?;
        let share: Share = json_parse(&share_bytes, "share")?;
        let sk: PrivateKey<Integer, SchnorrGroup> =
            PrivateKey::from_encrypted(&self.symmetric, &share.encrypted_sk, &ctx.group)?;
        if sk.public_value != share.share {
            return Err(TrusteeError::Symmetric(
                "unwrapped private share does not match the posted public share".to_string(),
            ));
        }

        let keymaker = Keymaker::from_sk(sk, &ctx.group);
        let (factors, proofs) = keymaker.decryption_factor_many(&final_mix.mixed_ballots);
        let pd = PartialDecryption {
            proofs,
            pd_ballots: factors,
        };
        let (pd_bytes, pd_hash) = pd.to_bytes()?;

        let stmt = DecryptionStatement::new(&pd_hash, &tip, &ctx.cfg_hash, item);
        let sig = self.keys.sign(&canonical_bytes(&stmt));
        board.add_decryption(item, ctx.self_pos, pd_bytes, &stmt, &sig)?;

        Ok(())
    }

    /// Combines all partial decryptions into plaintexts. The designated
    /// decryptor publishes; everyone else re-derives and co-signs.
    fn add_or_sign_plaintexts<B: BulletinBoard>(
        &self,
        board: &mut B,
        item: u32,
    ) -> Result<(), TrusteeError> {
        let ctx = self.valid_context(board)?;

        let final_mixer = trustee_at_position(ctx.n, item, ctx.n);
        let mix_bytes = board.get_bytes(&B::mix(item, final_mixer))?;
        let (final_mix, final_hash) = Mix::from_bytes(&mix_bytes)?;

        let mut factors: Vec<Vec<Integer>> = Vec::with_capacity(ctx.n as usize);
        let mut pd_hashes: Vec<Hash> = Vec::with_capacity(ctx.n as usize);
        for auth in 1..=ctx.n {
            let pd_bytes = board.get_bytes(&B::decryption(item, auth))?;
            let (pd, pd_hash) = PartialDecryption::from_bytes(&pd_bytes)?;

            let stmt_bytes = board.get_bytes(&B::decryption_stmt(item, auth))?;
            let recomputed = canonical_bytes(&DecryptionStatement::new(
                &pd_hash,
                &final_hash,
                &ctx.cfg_hash,
                item,
            ));
            if recomputed != stmt_bytes {
                return Err(TrusteeError::StatementMismatch(format!(
                    "decryption statement of trustee [{}] item [{}]",
                    auth, item
                )));
            }
            let sig = board.get_bytes(&B::decryption_sig(item, auth))?;
            ctx.trustee_key(auth).verify(&stmt_bytes, &sig)?;

            if pd.pd_ballots.len() != final_mix.mixed_ballots.len() {
                return Err(TrusteeError::Malformed(format!(
                    "partial decryption of trustee [{}] item [{}] has wrong length",
                    auth, item
                )));
            }
            if auth != ctx.self_pos {
                let share_bytes = board.get_bytes(&B::share(item, auth))?;
                let share: Share = json_parse(&share_bytes, "share")?;
                let ok = Keymaker::verify_decryption_factors(
                    &ctx.group,
                    &share.share,
                    &final_mix.mixed_ballots,
                    &pd.pd_ballots,
                    &pd.proofs,
                );
                if !ok {
                    return Err(TrusteeError::ProofFailure(format!(
                        "decryption proof of trustee [{}] item [{}]",
                        auth, item
                    )));
                }
            }

            factors.push(pd.pd_ballots);
            pd_hashes.push(pd_hash);
        }

        let decryptions_hash = combine_hashes(&pd_hashes);
        let elements = Keymaker::<Integer, SchnorrGroup>::joint_dec_many(
            &ctx.group,
            &factors,
            &final_mix.mixed_ballots,
        );
        let decoded: Vec<Integer> = elements.iter().map(|e| ctx.group.decode(e)).collect();
        let (plaintexts_bytes, plaintexts_hash) = json_bytes(&Plaintexts {
            plaintexts: decoded,
        });

        if decryptor(item, ctx.n) == ctx.self_pos && board.get(&B::plaintexts(item)).is_none() {
            let stmt = PlaintextsStatement::new(
                &plaintexts_hash,
                &decryptions_hash,
                &ctx.cfg_hash,
                item,
            );
            let sig = self.keys.sign(&canonical_bytes(&stmt));
            board.add_plaintexts(item, ctx.self_pos, plaintexts_bytes, &stmt, &sig)?;
            info!(
                "published plaintexts {} for item [{}]",
                short(&plaintexts_hash),
                item
            );
        } else {
            let posted_bytes = board.get_bytes(&B::plaintexts(item))?;
            if hash_bytes(&posted_bytes) != plaintexts_hash {
                return Err(TrusteeError::StatementMismatch(format!(
                    "posted plaintexts for item [{}] differ from locally derived plaintexts",
                    item
                )));
            }
            let stmt_bytes = board.get_bytes(&B::plaintexts_stmt(item))?;
            let recomputed = canonical_bytes(&PlaintextsStatement::new(
                &plaintexts_hash,
                &decryptions_hash,
                &ctx.cfg_hash,
                item,
            ));
            if recomputed != stmt_bytes {
                return Err(TrusteeError::StatementMismatch(format!(
                    "plaintexts statement for item [{}]",
                    item
                )));
            }
            let sig = self.keys.sign(&stmt_bytes);
            board.add_plaintexts_sig(item, ctx.self_pos, &sig)?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn h(byte: u8) -> Hash {
        [byte; 64]
    }

    #[test]
    fn test_reduce_chain_linear() {
        let edges = vec![(h(0), h(1)), (h(1), h(2)), (h(2), h(3))];
        assert_eq!(reduce_chain(&edges, &h(0)).unwrap(), h(3));

        // order of edges is irrelevant
        let edges = vec![(h(2), h(3)), (h(0), h(1)), (h(1), h(2))];
        assert_eq!(reduce_chain(&edges, &h(0)).unwrap(), h(3));
    }

    #[test]
    fn test_reduce_chain_break() {
        // the middle edge does not join
        let edges = vec![(h(0), h(1)), (h(9), h(2)), (h(2), h(3))];
        assert!(matches!(
            reduce_chain(&edges, &h(0)),
            Err(TrusteeError::ChainFailure(_))
        ));
    }

    #[test]
    fn test_reduce_chain_wrong_root() {
        let edges = vec![(h(0), h(1)), (h(1), h(2))];
        assert!(reduce_chain(&edges, &h(7)).is_err());
    }

    #[test]
    fn test_reduce_chain_fork() {
        // two mixes claim the same parent
        let edges = vec![(h(0), h(1)), (h(0), h(2))];
        assert!(reduce_chain(&edges, &h(0)).is_err());
    }

    #[test]
    fn test_reduce_chain_cycle() {
        // a cycle disconnected from the ballots
        let edges = vec![(h(1), h(2)), (h(2), h(1))];
        assert!(reduce_chain(&edges, &h(0)).is_err());
    }
}
