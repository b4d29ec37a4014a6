//! Driver-private statistics
//!
//! Error classification counters from the descriptor status words, DMA
//! interrupt accounting and the work counters of the poller and the
//! reclaimer. All counters are relaxed atomics and may be bumped from any
//! context; readers get a `Copy` snapshot.

use crate::drivers::net::netdev::counters;

counters! {
    StmmacExtraCounters =>
    StmmacExtraStats {
        // transmit errors
        tx_underflow,
        tx_carrier,
        tx_losscarrier,
        tx_heartbeat,
        tx_deferred,
        tx_vlan,
        tx_jabber,
        tx_frame_flushed,
        tx_payload_error,
        tx_ip_header_error,
        // receive errors
        rx_desc,
        rx_partial,
        rx_runt,
        rx_toolong,
        rx_collision,
        rx_crc,
        rx_length,
        rx_mii,
        rx_multicast,
        rx_gmac_overflow,
        rx_watchdog,
        da_rx_filter_fail,
        sa_rx_filter_fail,
        rx_missed_cntr,
        rx_overflow_cntr,
        rx_vlan,
        // abnormal DMA interrupts
        tx_undeflow_irq,
        tx_process_stopped_irq,
        tx_jabber_irq,
        rx_overflow_irq,
        rx_buf_unav_irq,
        rx_process_stopped_irq,
        rx_watchdog_irq,
        tx_early_irq,
        fatal_bus_error_irq,
        /// Current transmit FIFO threshold (a gauge, not a counter)
        threshold,
        // work accounting
        tx_pkt_n,
        rx_pkt_n,
        poll_n,
        sched_timer_n,
        normal_irq_n,
        dma_rx_normal_irq,
        dma_tx_normal_irq,
        rx_poll_n,
        tx_task_n,
        // GMAC host interrupts
        mmc_tx_irq_n,
        mmc_rx_irq_n,
        mmc_rx_csum_offload_irq_n,
        irq_receive_pmt_irq_n,
    }
}
