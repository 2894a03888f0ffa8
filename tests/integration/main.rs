mod support;
mod token_refresher;
