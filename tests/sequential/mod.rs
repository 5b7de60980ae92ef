mod failure;
mod parallelism;
