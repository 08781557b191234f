use async_trait::async_trait;
use notefeed::{AmountPrompt, ZapObserver, ZapState, ZapTarget};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

/// Asks on the terminal. Enter takes the default, end of input backs out.
pub struct StdinPrompt;

#[async_trait]
impl AmountPrompt for StdinPrompt {
    async fn ask_amount(&self, target: &ZapTarget, default_sats: u64) -> Option<String> {
        let mut stdout = tokio::io::stdout();
        let question = format!("zap {} how many sats? [{default_sats}] ", target.author);
        stdout.write_all(question.as_bytes()).await.ok()?;
        stdout.flush().await.ok()?;

        let mut line = String::new();
        let read = BufReader::new(tokio::io::stdin())
            .read_line(&mut line)
            .await
            .ok()?;
        if read == 0 {
            return None;
        }

        let line = line.trim();
        if line.is_empty() {
            Some(default_sats.to_string())
        } else {
            Some(line.to_owned())
        }
    }
}

/// Amount given up front with `--amount`.
pub struct FixedPrompt(pub u64);

#[async_trait]
impl AmountPrompt for FixedPrompt {
    async fn ask_amount(&self, _target: &ZapTarget, _default_sats: u64) -> Option<String> {
        Some(self.0.to_string())
    }
}

pub struct PrintObserver;

impl ZapObserver for PrintObserver {
    fn state_changed(&self, _target: &ZapTarget, state: &ZapState) {
        match state {
            ZapState::Idle => {}
            ZapState::ResolvingProfile => println!("looking up lightning address..."),
            ZapState::BuildingRequest { endpoint } => println!("paying to {endpoint}"),
            ZapState::NegotiatingInvoice { .. } => println!("requesting invoice..."),
            ZapState::AwaitingPayment { .. } => println!("paying invoice..."),
            ZapState::Settled(receipt) => println!("zapped! preimage {}", receipt.preimage),
            ZapState::Failed(err) => println!("zap failed: {err}"),
        }
    }

    fn loading(&self, _target: &ZapTarget, _loading: bool) {}
}
