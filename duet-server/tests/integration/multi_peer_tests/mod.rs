mod test_concurrent_joins;
mod test_third_participant;
