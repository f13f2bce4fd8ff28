mod helpers;
mod status;
mod webhooks;
