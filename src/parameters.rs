use std::fmt;
use std::str::FromStr;

use crate::error::TapeError;

/// Sizes a tape exposes through
/// [`get_parameter`](crate::Tape::get_parameter) and
/// [`set_parameter`](crate::Tape::set_parameter).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TapeParameter {
    /// Slots in the adjoint vector. Setting resizes it.
    AdjointSize,
    /// Slots in the primal vector (primal-value tapes only). Setting resizes it.
    PrimalSize,
    /// Recorded statements. Setting reserves capacity.
    StatementSize,
    /// Recorded Jacobian entries. Setting reserves capacity.
    JacobianSize,
    /// Recorded external function records. Setting reserves capacity.
    ExternalFunctionSize,
    /// Bytes in the fixed and dynamic segments together. Setting reserves
    /// that many bytes in each.
    ByteDataSize,
    /// Largest identifier issued so far. Read-only.
    LargestIdentifier,
}

impl TapeParameter {
    pub const ALL: [TapeParameter; 7] = [
        TapeParameter::AdjointSize,
        TapeParameter::PrimalSize,
        TapeParameter::StatementSize,
        TapeParameter::JacobianSize,
        TapeParameter::ExternalFunctionSize,
        TapeParameter::ByteDataSize,
        TapeParameter::LargestIdentifier,
    ];

    pub fn name(self) -> &'static str {
        match self {
            TapeParameter::AdjointSize => "adjoint_size",
            TapeParameter::PrimalSize => "primal_size",
            TapeParameter::StatementSize => "statement_size",
            TapeParameter::JacobianSize => "jacobian_size",
            TapeParameter::ExternalFunctionSize => "external_function_size",
            TapeParameter::ByteDataSize => "byte_data_size",
            TapeParameter::LargestIdentifier => "largest_identifier",
        }
    }

    pub fn is_read_only(self) -> bool {
        self == TapeParameter::LargestIdentifier
    }
}

impl fmt::Display for TapeParameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for TapeParameter {
    type Err = TapeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TapeParameter::ALL
            .into_iter()
            .find(|p| p.name() == s)
            .ok_or_else(|| TapeError::UnsupportedParameter { name: s.to_string() })
    }
}
