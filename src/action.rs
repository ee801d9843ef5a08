use std::fmt;

/// The protocol operators, dispatched by the driver when their rule
/// matches the observed board. Variant order is the priority order used
/// to break ties within a cycle.
#[derive(Clone, PartialEq, Eq, Hash)]
pub enum Action {
    Stop(String),
    ValidateConfig,
    AddShare(u32),
    AddOrSignPublicKey(u32),
    AddPreShuffleData(u32),
    AddMix(u32),
    VerifyMix(u32, u32),
    AddDecryption(u32),
    AddOrSignPlaintexts(u32),
}

impl Action {
    pub fn priority(&self) -> u32 {
        match self {
            Action::Stop(_) => 0,
            Action::ValidateConfig => 1,
            Action::AddShare(_) => 2,
            Action::AddOrSignPublicKey(_) => 3,
            Action::AddPreShuffleData(_) => 4,
            Action::AddMix(_) => 5,
            Action::VerifyMix(..) => 6,
            Action::AddDecryption(_) => 7,
            Action::AddOrSignPlaintexts(_) => 8,
        }
    }

    pub fn item(&self) -> Option<u32> {
        match self {
            Action::Stop(_) | Action::ValidateConfig => None,
            Action::AddShare(p)
            | Action::AddOrSignPublicKey(p)
            | Action::AddPreShuffleData(p)
            | Action::AddMix(p)
            | Action::VerifyMix(p, _)
            | Action::AddDecryption(p)
            | Action::AddOrSignPlaintexts(p) => Some(*p),
        }
    }
}

impl fmt::Debug for Action {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Action::Stop(msg) => write!(f, "Stop [{}]", msg),
            Action::ValidateConfig => write!(f, "ValidateConfig"),
            Action::AddShare(p) => write!(f, "AddShare item=[{}]", p),
            Action::AddOrSignPublicKey(p) => write!(f, "AddOrSignPublicKey item=[{}]", p),
            Action::AddPreShuffleData(p) => write!(f, "AddPreShuffleData item=[{}]", p),
            Action::AddMix(p) => write!(f, "AddMix item=[{}]", p),
            Action::VerifyMix(p, a) => write!(f, "VerifyMix item=[{}] mixer=[{}]", p, a),
            Action::AddDecryption(p) => write!(f, "AddDecryption item=[{}]", p),
            Action::AddOrSignPlaintexts(p) => write!(f, "AddOrSignPlaintexts item=[{}]", p),
        }
    }
}

/// What a completed action run produced. The third case of the
/// ok/stop/error triad is the `Err` side of the action's `Result`,
/// carrying a typed error kind; the driver collects those per cycle
/// and posts them under this trustee's error key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Ok,
    Stop(String),
}
