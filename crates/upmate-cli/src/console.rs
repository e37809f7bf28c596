//! Terminal presentation gateway.
//!
//! A terminal cannot host a web view, so update surfaces are printed as a
//! link with their style. The surface counts as dismissed by the user as
//! soon as it has been printed.

use async_trait::async_trait;
use tracing::debug;
use upmate::{
    opens_externally, DismissReason, Dismissal, PresentationGateway, PresentationRequest,
    UpdateError,
};

/// Prints update surfaces to stdout.
#[derive(Debug, Default)]
pub struct ConsoleGateway {
    quiet: bool,
}

impl ConsoleGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Gateway that prints nothing; used with JSON output.
    pub fn quiet() -> Self {
        Self { quiet: true }
    }
}

/// Text shown for a presentation request.
pub fn render(request: &PresentationRequest) -> String {
    let style = request.style.effective();
    let mut line = if request.toast {
        format!("Update: {}", request.url)
    } else {
        format!("Update available ({style}): {}", request.url)
    };
    if opens_externally(&request.url) {
        line.push_str(" [opens externally]");
    }
    line
}

#[async_trait]
impl PresentationGateway for ConsoleGateway {
    async fn present(&self, request: PresentationRequest) -> Result<Dismissal, UpdateError> {
        debug!("Presenting {} on console", request.url);
        if !self.quiet {
            println!("{}", render(&request));
        }
        Ok(Dismissal::resolved(DismissReason::User))
    }
}
