use crate::CommentaryRequest;
use market_core::PriceDirection;

pub struct CommentaryTemplate;

impl CommentaryTemplate {
    /// Canned commentary used whenever the language model cannot answer.
    pub fn fallback(request: &CommentaryRequest) -> String {
        let symbol = &request.symbol;
        let percent = request.percent_change.abs().round_dp(2);
        let price = request.current_price.normalize();

        match request.direction {
            PriceDirection::Up => format!(
                "{symbol} is up {percent}% over the last 24 hours and now trades at ${price}. \
                 Momentum is strong; consider whether to lock in part of the gain or keep holding."
            ),
            PriceDirection::Down => format!(
                "{symbol} is down {percent}% over the last 24 hours and now trades at ${price}. \
                 Review your position size and risk tolerance before adding or exiting."
            ),
        }
    }

    pub fn system_prompt() -> &'static str {
        "You are a concise crypto market assistant. Answer in at most two sentences, \
         plain text, no markdown, and never give guaranteed predictions."
    }

    pub fn user_prompt(request: &CommentaryRequest) -> String {
        let verb = match request.direction {
            PriceDirection::Up => "risen",
            PriceDirection::Down => "fallen",
        };
        format!(
            "{symbol} has {verb} {percent}% in the last 24 hours and the current price is {price} USDT. \
             Give a short analysis of what this move may mean for a holder of {symbol}.",
            symbol = request.symbol,
            percent = request.percent_change.abs().round_dp(2),
            price = request.current_price.normalize(),
        )
    }
}
