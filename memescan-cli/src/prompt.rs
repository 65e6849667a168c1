//! Terminal confirmation dialogs for the local wallet.

use std::io::{self, BufRead, Write};

use alloy_primitives::Address;
use memescan::wallet::AddChainParams;
use memescan_evm::wallet::{SigningPrompt, TransactionPrompt};

/// Asks on stderr and reads the answer from stdin.
#[derive(Debug, Clone, Copy, Default)]
pub struct TerminalPrompt {
    assume_yes: bool,
}

impl TerminalPrompt {
    /// Creates a prompt; with `assume_yes` every question is answered yes.
    #[must_use]
    pub const fn new(assume_yes: bool) -> Self {
        Self { assume_yes }
    }

    fn ask(&self, question: &str) -> bool {
        if self.assume_yes {
            return true;
        }
        confirm(question, &mut io::stdin().lock(), &mut io::stderr().lock())
    }
}

impl SigningPrompt for TerminalPrompt {
    fn confirm_connection(&self, account: Address) -> bool {
        self.ask(&format!("Connect account {account}?"))
    }

    fn confirm_add_chain(&self, params: &AddChainParams) -> bool {
        self.ask(&format!(
            "Add network {} (chain {}, {}, RPC {}) to the wallet?",
            params.chain_name,
            params.chain_id,
            params.native_symbol,
            params.rpc_urls.join(", ")
        ))
    }

    fn confirm_transaction(&self, prompt: &TransactionPrompt) -> bool {
        self.ask(&format!(
            "{}\n  from {} to {} on chain {}\nSign and send?",
            prompt.summary, prompt.from, prompt.to, prompt.chain_id
        ))
    }
}

/// Writes `question`, reads one line, and accepts `y` or `yes`.
///
/// Any I/O failure counts as a no.
pub fn confirm(question: &str, input: &mut impl BufRead, output: &mut impl Write) -> bool {
    if write!(output, "{question} [y/N] ")
        .and_then(|()| output.flush())
        .is_err()
    {
        return false;
    }
    let mut answer = String::new();
    if input.read_line(&mut answer).is_err() {
        return false;
    }
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn answer(text: &str) -> bool {
        let mut out = Vec::new();
        let result = confirm("Proceed?", &mut text.as_bytes(), &mut out);
        assert_eq!(String::from_utf8(out).unwrap(), "Proceed? [y/N] ");
        result
    }

    #[test]
    fn only_explicit_yes_confirms() {
        assert!(answer("y\n"));
        assert!(answer("YES\n"));
        assert!(!answer("\n"));
        assert!(!answer("no\n"));
        assert!(!answer(""));
    }

    #[test]
    fn assume_yes_skips_the_question() {
        let prompt = TerminalPrompt::new(true);
        assert!(prompt.confirm_connection(Address::ZERO));
    }
}
