mod test_disconnect_triggers_leave;
mod test_rejoin_switches_room;
mod test_websocket_join_round_trip;
