mod test_signal_to_departed_peer_dropped;
