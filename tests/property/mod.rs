mod fingerprints;
mod resolvers;
mod retry_decisions;
